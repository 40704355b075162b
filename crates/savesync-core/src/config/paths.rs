use std::path::{Path, PathBuf};

/// Every on-disk location the application uses, resolved once at startup and
/// handed to the components that need it.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub base_dir: PathBuf,
    pub config_file: PathBuf,
    /// One `<provider-id>.config` credential file per backend.
    pub storage_config_dir: PathBuf,
    /// Root of the local backup history; one subfolder per save directory.
    pub backups_root: PathBuf,
    /// Per-user secret protecting stored credentials.
    pub user_key_file: PathBuf,
}

impl AppPaths {
    pub fn new(base_dir: &Path) -> Self {
        Self {
            base_dir: base_dir.to_path_buf(),
            config_file: base_dir.join("savesync.toml"),
            storage_config_dir: base_dir.join("storageconfig"),
            backups_root: base_dir.join("backups"),
            user_key_file: base_dir.join("user.key"),
        }
    }

    /// `backups/<last component of the save path>`
    pub fn backups_dir_for(&self, save_path: &Path) -> PathBuf {
        match save_path.file_name() {
            Some(name) => self.backups_root.join(name),
            None => self.backups_root.join("save"),
        }
    }
}

/// Expand `%VAR%`, `${VAR}`, `$VAR` and a leading `~` from the process
/// environment. Unknown variables are left untouched.
pub fn expand_env_vars(input: &str) -> String {
    expand_with(input, |name| {
        std::env::var(name).ok().or_else(|| {
            if name == "HOME" {
                dirs::home_dir().map(|h| h.display().to_string())
            } else {
                None
            }
        })
    })
}

/// Same as [`expand_env_vars`] with an explicit variable lookup.
pub fn expand_with<F>(input: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let unix = shellexpand::full_with_context_no_errors(input, || lookup("HOME"), |name| lookup(name));
    expand_percent(&unix, &lookup)
}

/// Windows-style `%VAR%` references, which shellexpand does not know.
fn expand_percent<F>(input: &str, lookup: &F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find('%') {
        let after = &rest[start + 1..];
        let Some(end) = after.find('%') else {
            break;
        };
        let name = &after[..end];
        match lookup(name).filter(|_| is_var_name(name)) {
            Some(value) => {
                out.push_str(&rest[..start]);
                out.push_str(&value);
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[..=start]);
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn is_var_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '(' || c == ')')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(name: &str) -> Option<String> {
        match name {
            "APPDATA" => Some("C:/Users/me/AppData/Roaming".into()),
            "HOME" => Some("/home/me".into()),
            "GAME_DIR" => Some("games".into()),
            _ => None,
        }
    }

    #[test]
    fn expands_windows_style() {
        assert_eq!(
            expand_with("%APPDATA%/DarkSoulsIII", env),
            "C:/Users/me/AppData/Roaming/DarkSoulsIII"
        );
    }

    #[test]
    fn expands_unix_styles() {
        assert_eq!(expand_with("$HOME/.steam", env), "/home/me/.steam");
        assert_eq!(expand_with("${HOME}/x/$GAME_DIR", env), "/home/me/x/games");
        assert_eq!(expand_with("~/saves", env), "/home/me/saves");
    }

    #[test]
    fn unknown_variables_stay() {
        assert_eq!(expand_with("%NOPE%/a", env), "%NOPE%/a");
        assert_eq!(expand_with("$NOPE/a", env), "$NOPE/a");
        assert_eq!(expand_with("100% sure", env), "100% sure");
        assert_eq!(expand_with("a~b", env), "a~b");
        assert_eq!(expand_with("50%%GAME_DIR%", env), "50%games");
    }

    #[test]
    fn mixed_styles_in_one_path() {
        assert_eq!(
            expand_with("~/%GAME_DIR%/${GAME_DIR}", env),
            "/home/me/games/games"
        );
    }

    #[test]
    fn backups_dir_uses_last_component() {
        let paths = AppPaths::new(Path::new("/base"));
        assert_eq!(
            paths.backups_dir_for(Path::new("/home/me/DarkSoulsIII")),
            PathBuf::from("/base/backups/DarkSoulsIII")
        );
        assert_eq!(paths.config_file, PathBuf::from("/base/savesync.toml"));
    }
}
