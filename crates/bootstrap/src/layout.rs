use diskstrap_host_linux::Host;
use serde::Serialize;

/// Subdirectories every provisioned data volume gets.
pub const DATA_DIRECTORIES: [&str; 4] = ["repositories", "metadata", "logs", "temp"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectoryResult {
    pub path: String,
    pub created: bool,
}

/// Creates the data layout under `mount_point`. Failures are logged and
/// reported per directory; none of them stop the caller.
pub fn create_data_directories(host: &Host<'_>, mount_point: &str) -> Vec<DirectoryResult> {
    tracing::info!(mount_point, "creating directory structure");
    DATA_DIRECTORIES
        .iter()
        .map(|name| {
            let path = format!("{}/{}", mount_point.trim_end_matches('/'), name);
            let created = host.attempt(&host.root("mkdir").args(["-p", path.as_str()]))
                && host.attempt(&host.root("chmod").args(["755", path.as_str()]));
            if !created {
                tracing::warn!(path = %path, "could not prepare directory");
            }
            DirectoryResult { path, created }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use diskstrap_exec::ScriptedExecutor;

    #[test]
    fn creates_four_directories() {
        let exec = ScriptedExecutor::new();
        let host = Host::new(&exec);
        let results = create_data_directories(&host, "/mnt/github-backup/");
        let paths: Vec<&str> = results.iter().map(|result| result.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "/mnt/github-backup/repositories",
                "/mnt/github-backup/metadata",
                "/mnt/github-backup/logs",
                "/mnt/github-backup/temp",
            ]
        );
        assert!(results.iter().all(|result| result.created));
        assert_eq!(exec.count_program("mkdir"), 4);
        assert_eq!(exec.count_program("chmod"), 4);
    }

    #[test]
    fn failures_do_not_stop_remaining_directories() {
        let exec = ScriptedExecutor::new().on_exit("sudo mkdir -p /srv/data/metadata", 1);
        let host = Host::new(&exec);
        let results = create_data_directories(&host, "/srv/data");
        assert_eq!(results.len(), 4);
        assert!(!results[1].created);
        assert!(results[3].created);
        assert_eq!(exec.count_program("chmod"), 3);
    }
}
