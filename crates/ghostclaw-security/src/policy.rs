//! Security policy (C9): workspace containment, command allowlist, autonomy
//! level, action rate limit, forbidden paths.

use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use ghostclaw_core::config::AutonomyLevel;

use crate::error::PolicyError;

/// Read-only after construction except for the interior-locked rate-limit
/// counter (§5 Shared resources).
pub struct SecurityPolicy {
    workspace_dir: PathBuf,
    allowed_commands: Vec<String>,
    autonomy: AutonomyLevel,
    forbidden_paths: Vec<PathBuf>,
    max_actions_per_hour: u32,
    counter: Mutex<RollingCounter>,
}

struct RollingCounter {
    window_start: Instant,
    count: u32,
}

impl SecurityPolicy {
    pub fn new(
        workspace_dir: impl AsRef<Path>,
        allowed_commands: Vec<String>,
        autonomy: AutonomyLevel,
        forbidden_paths: Vec<String>,
        max_actions_per_hour: u32,
    ) -> Self {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/".to_string());
        let forbidden_paths = forbidden_paths
            .into_iter()
            .map(|p| PathBuf::from(p.replacen('~', &home, 1)))
            .collect();
        Self {
            workspace_dir: workspace_dir.as_ref().to_path_buf(),
            allowed_commands,
            autonomy,
            forbidden_paths,
            max_actions_per_hour,
            counter: Mutex::new(RollingCounter {
                window_start: Instant::now(),
                count: 0,
            }),
        }
    }

    /// Canonicalize `path` under the workspace root. Any `..` component that
    /// would escape the root rejects with `PathEscape`.
    pub fn canonicalize_in_workspace(&self, path: &str) -> Result<PathBuf, PolicyError> {
        let candidate = Path::new(path);
        let mut resolved = if candidate.is_absolute() {
            PathBuf::new()
        } else {
            self.workspace_dir.clone()
        };

        for component in candidate.components() {
            match component {
                Component::ParentDir => {
                    if !resolved.pop() || !resolved.starts_with(&self.workspace_dir) {
                        return Err(PolicyError::PathEscape);
                    }
                }
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                Component::RootDir | Component::Prefix(_) => resolved.push(component.as_os_str()),
            }
        }

        if !resolved.starts_with(&self.workspace_dir) {
            return Err(PolicyError::PathEscape);
        }

        for forbidden in &self.forbidden_paths {
            if resolved.starts_with(forbidden) {
                return Err(PolicyError::ForbiddenPath(forbidden.display().to_string()));
            }
        }

        Ok(resolved)
    }

    /// `is_command_allowed` — trim leading whitespace, take the first
    /// whitespace-delimited token, reject if not in `allowed_commands`.
    pub fn is_command_allowed(&self, command: &str) -> bool {
        let first_token = command.trim_start().split_whitespace().next().unwrap_or("");
        if first_token.is_empty() {
            return false;
        }
        self.allowed_commands.iter().any(|c| c == first_token)
    }

    pub fn allows_write(&self) -> bool {
        !matches!(self.autonomy, AutonomyLevel::ReadOnly)
    }

    pub fn autonomy_level(&self) -> AutonomyLevel {
        self.autonomy
    }

    /// Returns `false` when the rolling hourly counter is already at
    /// capacity; does not itself admit the action.
    pub fn check_rate_limit(&self) -> bool {
        let mut counter = self.counter.lock().expect("rate limit mutex poisoned");
        counter.reset_if_expired();
        counter.count < self.max_actions_per_hour
    }

    /// Admits one action against the rolling hourly counter.
    pub fn record_action(&self) {
        let mut counter = self.counter.lock().expect("rate limit mutex poisoned");
        counter.reset_if_expired();
        counter.count += 1;
    }
}

impl RollingCounter {
    fn reset_if_expired(&mut self) {
        if self.window_start.elapsed() >= Duration::from_secs(3600) {
            self.window_start = Instant::now();
            self.count = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> SecurityPolicy {
        SecurityPolicy::new(
            "/workspace",
            vec!["ls".to_string(), "cat".to_string()],
            AutonomyLevel::Supervised,
            vec!["/etc".to_string()],
            2,
        )
    }

    #[test]
    fn rejects_path_escape() {
        let p = policy();
        assert_eq!(p.canonicalize_in_workspace("../../etc/passwd"), Err(PolicyError::PathEscape));
    }

    #[test]
    fn accepts_path_within_workspace() {
        let p = policy();
        let resolved = p.canonicalize_in_workspace("notes/todo.md").unwrap();
        assert_eq!(resolved, PathBuf::from("/workspace/notes/todo.md"));
    }

    #[test]
    fn command_allowlist_checks_first_token_only() {
        let p = policy();
        assert!(p.is_command_allowed("  ls -la /tmp"));
        assert!(!p.is_command_allowed("rm -rf /"));
    }

    #[test]
    fn rate_limit_admits_up_to_configured_max() {
        let p = policy();
        assert!(p.check_rate_limit());
        p.record_action();
        assert!(p.check_rate_limit());
        p.record_action();
        assert!(!p.check_rate_limit());
    }

    #[test]
    fn read_only_autonomy_forbids_writes() {
        let p = SecurityPolicy::new("/ws", vec![], AutonomyLevel::ReadOnly, vec![], 10);
        assert!(!p.allows_write());
    }
}
