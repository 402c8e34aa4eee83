//! Upstream release check.
//!
//! On startup and every six hours, fetch the latest release manifest and
//! remember its tag. `/status` reports `update_available` when the tag
//! differs from the running version. Builds that report version `"dev"`
//! never flag an update.

use std::time::Duration;

use serde::Deserialize;

use crate::daemon::Daemon;

const RELEASE_MANIFEST_URL: &str =
    "https://api.github.com/repos/agentnet/agentnet/releases/latest";

const CHECK_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);

#[derive(Deserialize)]
struct ReleaseManifest {
    #[serde(default)]
    tag_name: String,
}

/// True when `latest` names a release different from `version`.
pub fn update_available(version: &str, latest: Option<&str>) -> bool {
    let Some(latest) = latest else {
        return false;
    };
    if latest.is_empty() || version == "dev" {
        return false;
    }
    latest != version.trim_start_matches('v')
}

/// Check now and then every [`CHECK_INTERVAL`]. Network failures are
/// silent; the check repeats soon enough.
pub async fn check_loop(daemon: Daemon) {
    loop {
        check_latest(&daemon).await;
        tokio::time::sleep(CHECK_INTERVAL).await;
    }
}

async fn check_latest(daemon: &Daemon) {
    let response = match daemon.http().get(RELEASE_MANIFEST_URL).send().await {
        Ok(resp) => resp,
        Err(_) => return,
    };
    let manifest: ReleaseManifest = match response.json().await {
        Ok(m) => m,
        Err(_) => return,
    };

    let latest = manifest.tag_name.trim().trim_start_matches('v').to_string();
    if latest.is_empty() {
        return;
    }

    if update_available(daemon.version(), Some(&latest)) {
        tracing::warn!(
            "update available: {} -> {latest} (run: agentnet --version)",
            daemon.version()
        );
    }
    daemon.set_latest_version(latest).await;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
