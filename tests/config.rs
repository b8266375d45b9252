use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use assert_matches::assert_matches;

use doi_harvest::config::ConfigLoader;
use doi_harvest::error::HarvestError;

#[test]
fn config_file_overrides_defaults() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("doi-harvest.json");
    fs::write(
        &path,
        r#"{
  "save_dir": "pdfs",
  "doi_column": "DOI",
  "jobs": 4,
  "external_tool": {
    "program": "/opt/tools/fetch-paper",
    "args": ["{doi}", "{out_dir}"],
    "timeout_secs": 120
  },
  "direct": {
    "enabled": false,
    "user_agent": "lab-harvester/1.0"
  }
}"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve(path.to_str()).unwrap();

    assert_eq!(resolved.save_dir, PathBuf::from("pdfs"));
    assert_eq!(resolved.doi_column, "DOI");
    assert_eq!(resolved.status_column, "Download_Status");
    assert_eq!(resolved.jobs, 4);
    assert!(resolved.external_tool.enabled);
    assert_eq!(
        resolved.external_tool.command.program,
        PathBuf::from("/opt/tools/fetch-paper")
    );
    assert_eq!(resolved.external_tool.command.args, vec!["{doi}", "{out_dir}"]);
    assert_eq!(resolved.external_tool.timeout, Duration::from_secs(120));
    assert!(!resolved.direct.enabled);
    assert_eq!(resolved.direct.timeout, Duration::from_secs(30));
    assert_eq!(resolved.direct.user_agent.as_deref(), Some("lab-harvester/1.0"));
}

#[test]
fn explicit_missing_config_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("absent.json");

    let err = ConfigLoader::resolve(path.to_str()).unwrap_err();

    assert_matches!(err, HarvestError::ConfigRead(missing) if missing == path);
}

#[test]
fn malformed_config_is_a_parse_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("doi-harvest.json");
    fs::write(&path, "{ \"jobs\": \"many\" }").unwrap();

    let err = ConfigLoader::resolve(path.to_str()).unwrap_err();

    assert_matches!(err, HarvestError::ConfigParse(_));
}

#[test]
fn zero_timeout_is_rejected() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("doi-harvest.json");
    fs::write(&path, r#"{ "direct": { "timeout_secs": 0 } }"#).unwrap();

    let err = ConfigLoader::resolve(path.to_str()).unwrap_err();

    assert_matches!(err, HarvestError::ConfigValue(message) if message.contains("direct.timeout_secs"));
}
