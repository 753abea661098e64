use anyhow::{Context, Result};
use diskstrap_core::{now_utc_rfc3339, REPORT_SCHEMA_VERSION};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct ReportPaths {
    pub run_id: String,
    pub root: PathBuf,
    pub run_json: PathBuf,
    pub logs_path: PathBuf,
}

#[derive(Debug, Serialize)]
struct RunMetadata<'a> {
    run_id: &'a str,
    created_at_utc: String,
    schema_version: &'a str,
    meta: Option<Value>,
}

/// Writes `<base>/reports/<run id>/{run.json,logs.txt}` for one run.
pub fn create_report_bundle(
    base: impl AsRef<Path>,
    meta: Option<Value>,
    logs: Option<&str>,
) -> Result<ReportPaths> {
    let run_id = Uuid::new_v4().to_string();
    let root = base.as_ref().join("reports").join(&run_id);
    std::fs::create_dir_all(&root)
        .with_context(|| format!("create report dir {}", root.display()))?;

    let run_json = root.join("run.json");
    let logs_path = root.join("logs.txt");

    let run_meta = RunMetadata {
        run_id: &run_id,
        created_at_utc: now_utc_rfc3339(),
        schema_version: REPORT_SCHEMA_VERSION,
        meta,
    };
    let run_json_data = serde_json::to_string_pretty(&run_meta)?;
    std::fs::write(&run_json, run_json_data)
        .with_context(|| format!("write {}", run_json.display()))?;

    std::fs::write(&logs_path, logs.unwrap_or(""))
        .with_context(|| format!("write {}", logs_path.display()))?;

    Ok(ReportPaths {
        run_id,
        root,
        run_json,
        logs_path,
    })
}

/// Serializes `summary` as the bundle's meta section.
pub fn create_report_for<T: Serialize>(
    base: impl AsRef<Path>,
    summary: &T,
    logs: &str,
) -> Result<ReportPaths> {
    let meta = serde_json::to_value(summary).context("serialize run summary")?;
    create_report_bundle(base, Some(meta), Some(logs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundle_contains_metadata_and_logs() {
        let dir = tempfile::tempdir().unwrap();
        let meta = serde_json::json!({ "device": "/dev/sdc", "final_stage": "done" });
        let paths = create_report_bundle(dir.path(), Some(meta), Some("inspecting ok")).unwrap();

        assert!(paths.root.starts_with(dir.path().join("reports")));
        let run: Value = serde_json::from_str(&std::fs::read_to_string(&paths.run_json).unwrap()).unwrap();
        assert_eq!(run["run_id"], paths.run_id.as_str());
        assert_eq!(run["schema_version"], REPORT_SCHEMA_VERSION);
        assert_eq!(run["meta"]["device"], "/dev/sdc");
        assert_eq!(std::fs::read_to_string(&paths.logs_path).unwrap(), "inspecting ok");
    }

    #[test]
    fn each_run_gets_its_own_directory() {
        #[derive(Serialize)]
        struct Summary {
            ok: bool,
        }
        let dir = tempfile::tempdir().unwrap();
        let first = create_report_for(dir.path(), &Summary { ok: true }, "").unwrap();
        let second = create_report_for(dir.path(), &Summary { ok: false }, "").unwrap();
        assert_ne!(first.root, second.root);
        let run: Value = serde_json::from_str(&std::fs::read_to_string(&second.run_json).unwrap()).unwrap();
        assert_eq!(run["meta"]["ok"], false);
    }
}
