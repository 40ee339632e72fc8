//! Screening of oracle-proposed commands
//!
//! The oracle is told to stay read-only, but nothing forces it to. Commands
//! are checked against a deny-list of programs that mutate the host. Flagged
//! commands are reported, never rewritten or dropped.

use super::{DiagnosticCommand, DiagnosticTurn};

/// Programs that modify state or disrupt the host
const DENIED_PROGRAMS: &[&str] = &[
    "rm", "rmdir", "dd", "shred", "wipefs", "fdisk", "parted", "mkswap", "mv", "cp", "chmod",
    "chown", "chattr", "kill", "killall", "pkill", "shutdown", "reboot", "halt", "poweroff",
    "init", "useradd", "userdel", "passwd", "truncate", "crontab", "iptables", "mount", "umount",
];

/// Programs that are fine on their own but dangerous with certain subcommands
const DENIED_SUBCOMMANDS: &[(&str, &str)] = &[
    ("systemctl", "stop"),
    ("systemctl", "restart"),
    ("systemctl", "disable"),
    ("systemctl", "kill"),
    ("service", "stop"),
    ("service", "restart"),
    ("apt", "remove"),
    ("apt", "purge"),
    ("apt-get", "remove"),
    ("apt-get", "purge"),
    ("yum", "remove"),
    ("dnf", "remove"),
];

/// Wrappers whose first argument is the real program
const PASSTHROUGH: &[&str] = &["sudo", "timeout", "nice", "ionice", "env", "xargs", "nohup"];

/// Why a command was flagged
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnsafeReason {
    DeniedProgram(String),
    DeniedSubcommand(String, String),
    FileRedirection,
}

impl std::fmt::Display for UnsafeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnsafeReason::DeniedProgram(p) => write!(f, "runs {}", p),
            UnsafeReason::DeniedSubcommand(p, s) => write!(f, "runs {} {}", p, s),
            UnsafeReason::FileRedirection => write!(f, "redirects output into a file"),
        }
    }
}

/// Check one command line; `None` when nothing looks destructive
pub fn screen_command(command: &str) -> Option<UnsafeReason> {
    if writes_to_file(command) {
        return Some(UnsafeReason::FileRedirection);
    }

    // Each pipeline / sequence segment starts a new program
    for segment in command.split(['|', ';', '&']) {
        let words: Vec<&str> = segment.split_whitespace().collect();
        let Some(start) = words.iter().position(|w| !is_wrapper_token(w)) else {
            continue;
        };
        let program = basename(words[start]);

        if program.starts_with("mkfs") || DENIED_PROGRAMS.contains(&program) {
            return Some(UnsafeReason::DeniedProgram(program.to_string()));
        }
        if let Some(sub) = words.get(start + 1) {
            if DENIED_SUBCOMMANDS
                .iter()
                .any(|(p, s)| *p == program && s == sub)
            {
                return Some(UnsafeReason::DeniedSubcommand(
                    program.to_string(),
                    sub.to_string(),
                ));
            }
        }
    }
    None
}

/// Commands in a turn that look destructive, with the reason
pub fn flag_unsafe_commands(turn: &DiagnosticTurn) -> Vec<(&DiagnosticCommand, UnsafeReason)> {
    turn.commands
        .iter()
        .filter_map(|cmd| screen_command(&cmd.command).map(|reason| (cmd, reason)))
        .collect()
}

fn is_wrapper_token(word: &str) -> bool {
    PASSTHROUGH.contains(&basename(word))
        || word.starts_with('-')
        || word.contains('=')
        || is_duration(word)
}

/// Numeric arguments such as `timeout 5` or `timeout 1.5m`
fn is_duration(word: &str) -> bool {
    word.starts_with(|c: char| c.is_ascii_digit())
        && word
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | 's' | 'm' | 'h' | 'd'))
}

fn basename(word: &str) -> &str {
    word.rsplit('/').next().unwrap_or(word)
}

/// `>` or `>>` into anything other than /dev/null or a file descriptor
fn writes_to_file(command: &str) -> bool {
    let bytes = command.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'>' {
            let mut j = i + 1;
            if j < bytes.len() && bytes[j] == b'>' {
                j += 1;
            }
            let target = command[j..].trim_start();
            let is_fd = target.starts_with('&');
            let is_null = target.starts_with("/dev/null");
            if !is_fd && !is_null {
                return true;
            }
            i = j;
        } else {
            i += 1;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_only_commands_pass() {
        for cmd in [
            "top -b -n 1",
            "vmstat 1 5",
            "df -h",
            "journalctl -u nginx --since '1 hour ago' | tail -n 50",
            "grep -i error /var/log/syslog 2>/dev/null",
            "timeout 5 iostat -x 1 3",
            "systemctl status nginx",
            "ps aux --sort=-%cpu | head -20",
            "free -m 2>&1",
            "ss -tulpn",
        ] {
            assert_eq!(screen_command(cmd), None, "{}", cmd);
        }
    }

    #[test]
    fn test_destructive_commands_flagged() {
        assert_eq!(
            screen_command("rm -rf /tmp/cache"),
            Some(UnsafeReason::DeniedProgram("rm".into()))
        );
        assert_eq!(
            screen_command("sudo /sbin/mkfs.ext4 /dev/sdb1"),
            Some(UnsafeReason::DeniedProgram("mkfs.ext4".into()))
        );
        assert_eq!(
            screen_command("df -h && dd if=/dev/zero of=/dev/sda"),
            Some(UnsafeReason::DeniedProgram("dd".into()))
        );
        assert_eq!(
            screen_command("systemctl restart nginx"),
            Some(UnsafeReason::DeniedSubcommand("systemctl".into(), "restart".into()))
        );
        assert_eq!(
            screen_command("echo 3 > /proc/sys/vm/drop_caches"),
            Some(UnsafeReason::FileRedirection)
        );
        assert_eq!(
            screen_command("timeout 10 kill -9 1234"),
            Some(UnsafeReason::DeniedProgram("kill".into()))
        );
    }
}
