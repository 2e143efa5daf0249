use crate::services::receiver::{ReceiverBackend, ReceiverConfig};

/// Host name of this machine, used in the advertised device name.
pub(crate) fn hostname() -> String {
    hostname_or_default(sysinfo::System::host_name())
}

fn hostname_or_default(name: Option<String>) -> String {
    match name.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => "localhost".to_string(),
    }
}

/// Arguments passed to the receiver binary.
pub(crate) fn receiver_args(
    config: &ReceiverConfig,
    backend: &ReceiverBackend,
    hostname: &str,
) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "--bitrate".into(),
        config.bitrate.to_string(),
        "--device-type".into(),
        config.device_type.clone(),
        "--disable-audio-cache".into(),
        "--disable-credential-cache".into(),
        "--initial-volume".into(),
        "100".into(),
        "--name".into(),
        config.device_name.replace("{}", hostname),
        "--quiet".into(),
    ];

    if let Some(onevent_path) = config.onevent_path.as_deref() {
        if !onevent_path.trim().is_empty() {
            args.push("--onevent".into());
            args.push(onevent_path.trim().into());
        }
    }

    args.extend(config.options.split_whitespace().map(String::from));

    match backend {
        ReceiverBackend::Alsa { device } => {
            args.extend(["--backend".into(), "alsa".into(), "--device".into(), device.clone()]);
        }
        ReceiverBackend::PulseRtp { sink, .. } => {
            args.extend([
                "--backend".into(),
                "pulseaudio".into(),
                "--device".into(),
                sink.clone(),
            ]);
        }
    }

    args
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_build_alsa_command_line() {
        let config = ReceiverConfig {
            options: "--enable-volume-normalisation  --zeroconf-port 5353".into(),
            onevent_path: Some("/opt/onevent.py".into()),
            ..ReceiverConfig::default()
        };
        let backend = ReceiverBackend::Alsa {
            device: "hw:1,0".into(),
        };

        assert_eq!(
            receiver_args(&config, &backend, "kodi"),
            vec![
                "--bitrate",
                "320",
                "--device-type",
                "tv",
                "--disable-audio-cache",
                "--disable-credential-cache",
                "--initial-volume",
                "100",
                "--name",
                "Spotify Kodi Connect@kodi",
                "--quiet",
                "--onevent",
                "/opt/onevent.py",
                "--enable-volume-normalisation",
                "--zeroconf-port",
                "5353",
                "--backend",
                "alsa",
                "--device",
                "hw:1,0",
            ]
        );
    }

    #[test]
    fn should_build_pulseaudio_command_line() {
        let config = ReceiverConfig {
            device_name: "Living room".into(),
            ..ReceiverConfig::default()
        };
        let backend = config.resolve_backend().unwrap();

        let args = receiver_args(&config, &backend, "kodi");

        assert!(args.windows(2).any(|pair| pair == ["--name", "Living room"]));
        assert!(!args.contains(&"--onevent".to_string()));
        assert_eq!(
            args[args.len() - 4..],
            ["--backend", "pulseaudio", "--device", "spotify_kodi_connect"]
        );
    }

    #[test]
    fn should_resolve_hostname() {
        assert!(!hostname().is_empty());
        assert_eq!(hostname_or_default(Some(" kodi-box\n".into())), "kodi-box");
        assert_eq!(hostname_or_default(Some("  ".into())), "localhost");
        assert_eq!(hostname_or_default(None), "localhost");
    }
}
