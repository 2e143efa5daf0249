use crate::services::receiver::ProcessLaunchError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum ReceiverState {
    Stopped,
    Starting,
    Running,
    BackingOff,
    Failed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum ReceiverBackendKind {
    Alsa,
    PulseaudioRtp,
}

/// Audio output of the receiver, resolved from configuration on every launch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum ReceiverBackend {
    Alsa {
        device: String,
    },
    PulseRtp {
        address: String,
        port: u16,
        sink: String,
    },
}

impl ReceiverBackend {
    /// What the front-end should play while the receiver is active.
    pub(crate) fn stream_url(&self) -> Option<String> {
        match self {
            ReceiverBackend::Alsa { .. } => None,
            ReceiverBackend::PulseRtp { address, port, .. } => {
                Some(format!("rtp://{}:{}", address, port))
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub(crate) struct ReceiverStatus {
    pub(crate) state: ReceiverState,
    pub(crate) attempt_count: u32,
    pub(crate) backend: ReceiverBackendKind,
    pub(crate) last_error_summary: Option<String>,
    pub(crate) stream_url: Option<String>,
}

#[derive(Clone, Debug)]
pub(crate) struct ReceiverConfig {
    pub(crate) enabled: bool,
    pub(crate) backend: ReceiverBackendKind,
    pub(crate) alsa_device: String,
    pub(crate) device_name: String,
    pub(crate) options: String,
    pub(crate) bitrate: u32,
    pub(crate) device_type: String,
    pub(crate) onevent_path: Option<String>,
    pub(crate) librespot_path: String,
    pub(crate) max_attempts: u32,
    pub(crate) grace_period: Duration,
    pub(crate) backoff_base: Duration,
    pub(crate) stop_timeout: Duration,
    pub(crate) pa_rtp_address: String,
    pub(crate) pa_rtp_port: u16,
    pub(crate) pa_rtp_sink: String,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            backend: ReceiverBackendKind::PulseaudioRtp,
            alsa_device: "hw:2,0".into(),
            device_name: "Spotify Kodi Connect@{}".into(),
            options: String::new(),
            bitrate: 320,
            device_type: "tv".into(),
            onevent_path: None,
            librespot_path: "librespot".into(),
            max_attempts: 5,
            grace_period: Duration::from_secs(3),
            backoff_base: Duration::from_secs(1),
            stop_timeout: Duration::from_secs(5),
            pa_rtp_address: "127.0.0.1".into(),
            pa_rtp_port: 24643,
            pa_rtp_sink: "spotify_kodi_connect".into(),
        }
    }
}

impl ReceiverConfig {
    pub(crate) fn resolve_backend(&self) -> Result<ReceiverBackend, ProcessLaunchError> {
        match self.backend {
            ReceiverBackendKind::Alsa => {
                let device = self.alsa_device.trim();

                if device.is_empty() || device.contains(char::is_whitespace) {
                    return Err(ProcessLaunchError::InvalidDevice(self.alsa_device.clone()));
                }

                Ok(ReceiverBackend::Alsa {
                    device: device.to_string(),
                })
            }
            ReceiverBackendKind::PulseaudioRtp => {
                let sink = self.pa_rtp_sink.trim();

                if sink.is_empty() || self.pa_rtp_address.trim().is_empty() {
                    return Err(ProcessLaunchError::InvalidDevice(format!(
                        "{}@{}:{}",
                        self.pa_rtp_sink, self.pa_rtp_address, self.pa_rtp_port
                    )));
                }

                Ok(ReceiverBackend::PulseRtp {
                    address: self.pa_rtp_address.trim().to_string(),
                    port: self.pa_rtp_port,
                    sink: sink.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_resolve_configured_backend() {
        let config = ReceiverConfig::default();

        let backend = config.resolve_backend().unwrap();

        assert_eq!(
            backend,
            ReceiverBackend::PulseRtp {
                address: "127.0.0.1".into(),
                port: 24643,
                sink: "spotify_kodi_connect".into()
            }
        );
        assert_eq!(
            backend.stream_url().as_deref(),
            Some("rtp://127.0.0.1:24643")
        );

        let config = ReceiverConfig {
            backend: ReceiverBackendKind::Alsa,
            ..ReceiverConfig::default()
        };

        assert_eq!(
            config.resolve_backend().unwrap(),
            ReceiverBackend::Alsa {
                device: "hw:2,0".into()
            }
        );
    }

    #[test]
    fn should_reject_invalid_alsa_device() {
        let config = ReceiverConfig {
            backend: ReceiverBackendKind::Alsa,
            alsa_device: "  ".into(),
            ..ReceiverConfig::default()
        };

        assert!(matches!(
            config.resolve_backend(),
            Err(ProcessLaunchError::InvalidDevice(_))
        ));
    }
}
