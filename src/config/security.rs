// ABOUTME: Container hardening options applied to every release container.
// ABOUTME: Read-only root, dropped capabilities, no-new-privileges and tmpfs scratch mounts.

use serde::Deserialize;

use crate::runtime::SecurityOptions;

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    #[serde(default = "yes")]
    pub read_only: bool,

    #[serde(default = "yes")]
    pub no_new_privileges: bool,

    #[serde(default = "default_cap_drop")]
    pub cap_drop: Vec<String>,

    #[serde(default)]
    pub cap_add: Vec<String>,

    /// Writable scratch mounts; with a read-only root these are the only writable paths.
    #[serde(default = "default_tmpfs")]
    pub tmpfs: Vec<String>,

    #[serde(default)]
    pub user: Option<String>,
}

fn yes() -> bool {
    true
}

fn default_cap_drop() -> Vec<String> {
    vec!["ALL".to_string()]
}

fn default_tmpfs() -> Vec<String> {
    vec!["/tmp".to_string()]
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            read_only: true,
            no_new_privileges: true,
            cap_drop: default_cap_drop(),
            cap_add: Vec::new(),
            tmpfs: default_tmpfs(),
            user: None,
        }
    }
}

impl SecurityConfig {
    pub fn to_options(&self) -> SecurityOptions {
        SecurityOptions {
            read_only_root: self.read_only,
            no_new_privileges: self.no_new_privileges,
            cap_drop: self.cap_drop.clone(),
            cap_add: self.cap_add.clone(),
            tmpfs: self.tmpfs.clone(),
            user: self.user.clone(),
        }
    }
}
