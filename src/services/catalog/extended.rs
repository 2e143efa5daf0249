use serde::Serialize;

/// Where an extended field value came from. Later variants take precedence.
#[derive(Eq, PartialEq, Ord, PartialOrd, Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum FieldSource {
    Derived,
    Catalog,
    Provider,
}

#[derive(Eq, PartialEq, Clone, Debug, Serialize)]
pub(crate) struct Sourced<T> {
    pub(crate) value: T,
    pub(crate) source: FieldSource,
}

impl<T> Sourced<T> {
    pub(crate) fn new(value: T, source: FieldSource) -> Self {
        Self { value, source }
    }
}

pub(crate) trait Blank {
    fn is_blank(&self) -> bool;
}

impl Blank for String {
    fn is_blank(&self) -> bool {
        self.trim().is_empty()
    }
}

impl Blank for Vec<String> {
    fn is_blank(&self) -> bool {
        self.iter().all(|value| value.trim().is_empty())
    }
}

impl Blank for u64 {
    fn is_blank(&self) -> bool {
        false
    }
}

#[derive(Eq, PartialEq, Clone, Debug, Default, Serialize)]
pub(crate) struct ExtendedFields {
    pub(crate) label: Option<Sourced<String>>,
    pub(crate) copyrights: Option<Sourced<Vec<String>>>,
    pub(crate) genres: Option<Sourced<Vec<String>>>,
    pub(crate) follower_count: Option<Sourced<u64>>,
    pub(crate) biography: Option<Sourced<String>>,
    pub(crate) description: Option<Sourced<String>>,
    pub(crate) image_url: Option<Sourced<String>>,
}

/// Returns `true` when `existing` was replaced.
fn merge_field<T: Blank>(existing: &mut Option<Sourced<T>>, incoming: Option<Sourced<T>>) -> bool {
    let incoming = match incoming {
        Some(incoming) if !incoming.value.is_blank() => incoming,
        _ => return false,
    };

    let replace = match existing {
        None => true,
        Some(current) => current.value.is_blank() || incoming.source > current.source,
    };

    if replace {
        existing.replace(incoming);
    }

    replace
}

impl ExtendedFields {
    pub(crate) fn is_empty(&self) -> bool {
        *self == ExtendedFields::default()
    }

    /// Field-wise monotonic merge: a field only ever gains a value or moves to a
    /// higher-precedence source. Values from an equal source never overwrite.
    /// Returns `true` if any field changed.
    pub(crate) fn merge(&mut self, incoming: ExtendedFields) -> bool {
        let ExtendedFields {
            label,
            copyrights,
            genres,
            follower_count,
            biography,
            description,
            image_url,
        } = incoming;

        let mut changed = false;

        changed |= merge_field(&mut self.label, label);
        changed |= merge_field(&mut self.copyrights, copyrights);
        changed |= merge_field(&mut self.genres, genres);
        changed |= merge_field(&mut self.follower_count, follower_count);
        changed |= merge_field(&mut self.biography, biography);
        changed |= merge_field(&mut self.description, description);
        changed |= merge_field(&mut self.image_url, image_url);

        changed
    }

    /// Like [`merge`](Self::merge), but values from an equal source replace the
    /// existing ones. Used when a fresh catalog response supersedes an expired one.
    pub(crate) fn refresh_from(&mut self, fresh: ExtendedFields) {
        let mut refreshed = fresh;
        refreshed.merge(std::mem::take(self));
        *self = refreshed;
    }
}
