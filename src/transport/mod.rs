//! Remote transport: SSH command channel and tmux session layer.
//!
//! - `ssh`: builds and runs `ssh` invocations against the target
//! - `tmux`: implements [`SessionLayer`](crate::dispatcher::SessionLayer) on top of it

pub mod ssh;
pub mod tmux;

pub use ssh::SshTransport;
pub use tmux::TmuxSessionLayer;

/// Quote `value` for a POSIX shell.
///
/// Words made only of safe characters are returned unchanged; everything else
/// is wrapped in single quotes with embedded quotes written as `'\''`.
pub fn shell_quote(value: &str) -> String {
    let safe = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./=:@%+,".contains(c));
    if safe {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', r"'\''"))
    }
}

/// Quote and join a command line for display or for a remote shell
pub fn shell_join<S: AsRef<str>>(args: &[S]) -> String {
    args.iter()
        .map(|a| shell_quote(a.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_quote_safe_words() {
        assert_eq!(shell_quote("rrun-script-train"), "rrun-script-train");
        assert_eq!(shell_quote(".rrun/logs/a.log"), ".rrun/logs/a.log");
        assert_eq!(shell_quote("ubuntu@10.0.0.1"), "ubuntu@10.0.0.1");
    }

    #[test]
    fn test_shell_quote_needs_quotes() {
        assert_eq!(shell_quote(""), "''");
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote("$(rm -rf ~)"), "'$(rm -rf ~)'");
        assert_eq!(shell_quote("=name"), "=name");
    }

    #[test]
    fn test_shell_quote_embedded_single_quote() {
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn test_shell_join() {
        assert_eq!(shell_join(&["ssh", "-p", "22", "echo hi"]), "ssh -p 22 'echo hi'");
    }
}
