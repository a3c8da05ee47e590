use std::env;
use std::path::PathBuf;

/// `$SIMARCHIVE_HOME/.env` wins over the per-user config directory.
fn fallback_dotenv_path(
    simarchive_home: Option<PathBuf>,
    config_dir: Option<PathBuf>,
) -> Option<PathBuf> {
    match simarchive_home {
        Some(home) => Some(home.join(".env")),
        None => Some(config_dir?.join("simarchive").join(".env")),
    }
}

pub fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    let fallback = fallback_dotenv_path(
        env::var_os("SIMARCHIVE_HOME").map(PathBuf::from),
        dirs::config_dir(),
    );

    let Some(path) = fallback else {
        return;
    };
    if path.is_file() {
        let _ = dotenvy::from_path(&path);
    }
}

#[cfg(test)]
mod tests {
    use super::fallback_dotenv_path;
    use std::path::PathBuf;

    #[test]
    fn simarchive_home_takes_precedence() {
        let got = fallback_dotenv_path(
            Some(PathBuf::from("/opt/simarchive")),
            Some(PathBuf::from("/home/alice/.config")),
        );
        assert_eq!(got, Some(PathBuf::from("/opt/simarchive/.env")));
    }

    #[test]
    fn config_dir_used_when_home_unset() {
        let got = fallback_dotenv_path(None, Some(PathBuf::from("/home/alice/.config")));
        assert_eq!(
            got,
            Some(PathBuf::from("/home/alice/.config/simarchive/.env"))
        );
    }

    #[test]
    fn nothing_to_load_without_either_directory() {
        assert_eq!(fallback_dotenv_path(None, None), None);
    }
}
