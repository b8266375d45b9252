#![cfg(unix)]

mod common;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use assert_matches::assert_matches;

use doi_harvest::app::{App, CancelFlag, RunOptions};
use doi_harvest::catalog::Catalog;
use doi_harvest::chain::{ChainLink, StrategyChain};
use doi_harvest::direct::DirectResolutionStrategy;
use doi_harvest::domain::{AcquisitionStatus, ArtifactSource, Doi};
use doi_harvest::error::AcquireError;
use doi_harvest::external_tool::{ExternalToolStrategy, TEMP_DIR_PREFIX, ToolCommand};
use doi_harvest::filename::canonical_filename;
use doi_harvest::output::JsonOutput;
use doi_harvest::store::Store;
use doi_harvest::strategy::Strategy;

use common::{Route, landing_page, serve, serve_silently};

const PDF_BYTES: &[u8] = b"%PDF-1.4\n%stub\n";

fn shell_tool(script: &str) -> ToolCommand {
    ToolCommand {
        program: PathBuf::from("sh"),
        args: vec![
            "-c".to_string(),
            script.to_string(),
            "sh".to_string(),
            "{out_dir}".to_string(),
            "{doi}".to_string(),
        ],
    }
}

fn app(save_dir: &Path, tool: ToolCommand, tool_timeout: Duration, resolver: &str) -> App {
    let external = ExternalToolStrategy::new(tool, save_dir);
    let direct = DirectResolutionStrategy::new(resolver, None).unwrap();
    let chain = StrategyChain::new(vec![
        ChainLink::new(external, tool_timeout),
        ChainLink::new(direct, Duration::from_secs(5)),
    ]);
    App::new(Store::new(save_dir.to_path_buf()).unwrap(), chain)
}

fn one_row(doi: &str) -> Catalog {
    Catalog::from_reader(format!("TI,DO\nA paper,{doi}\n").as_bytes()).unwrap()
}

fn options() -> RunOptions {
    RunOptions {
        doi_column: "DO".to_string(),
        status_column: "Download_Status".to_string(),
        jobs: 1,
    }
}

fn leftover_scratch_dirs(save_dir: &Path) -> usize {
    fs::read_dir(save_dir)
        .unwrap()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(TEMP_DIR_PREFIX))
        .count()
}

#[test]
fn external_tool_output_is_renamed_to_canonical_file() {
    let temp = tempfile::tempdir().unwrap();
    let save_dir = temp.path().join("papers");
    let app = app(
        &save_dir,
        shell_tool(r#"printf '%%PDF-1.4' > "$1/paper.pdf""#),
        Duration::from_secs(10),
        "http://127.0.0.1:9",
    );

    let result = app
        .run(&one_row("10.1000/xyz123"), &options(), &CancelFlag::new(), &JsonOutput)
        .unwrap();

    let record = &result.records[0];
    assert_eq!(record.status, AcquisitionStatus::Success);
    assert_eq!(
        record.source,
        Some(ArtifactSource::Strategy("external-tool".to_string()))
    );
    assert_eq!(
        fs::read(save_dir.join("10.1000%2Fxyz123.pdf")).unwrap(),
        b"%PDF-1.4"
    );
    assert_eq!(leftover_scratch_dirs(&save_dir), 0);

    let mut written = Vec::new();
    result.catalog.to_writer(&mut written).unwrap();
    assert_eq!(
        String::from_utf8(written).unwrap(),
        "TI,DO,Download_Status\nA paper,10.1000/xyz123,Y\n"
    );
}

#[test]
fn timed_out_tool_falls_back_to_direct_resolution() {
    let base = serve(vec![
        ("/10.1000/xyz123", Route::Redirect("/article/xyz123")),
        (
            "/article/xyz123",
            Route::Html(landing_page(&["/about", "/content/paper.pdf"])),
        ),
        ("/content/paper.pdf", Route::Pdf(PDF_BYTES.to_vec())),
    ]);
    let temp = tempfile::tempdir().unwrap();
    let save_dir = temp.path().join("papers");
    let app = app(
        &save_dir,
        shell_tool("exec sleep 5"),
        Duration::from_millis(300),
        &base,
    );

    let result = app
        .run(&one_row("10.1000/xyz123"), &options(), &CancelFlag::new(), &JsonOutput)
        .unwrap();

    let record = &result.records[0];
    assert_eq!(record.status, AcquisitionStatus::Success);
    assert_eq!(
        record.source,
        Some(ArtifactSource::Strategy("direct-resolution".to_string()))
    );
    assert_eq!(
        fs::read(save_dir.join("10.1000%2Fxyz123.pdf")).unwrap(),
        PDF_BYTES
    );
    assert_eq!(leftover_scratch_dirs(&save_dir), 0);
}

#[test]
fn no_pdf_anywhere_leaves_no_file() {
    let base = serve(vec![
        ("/10.1000/nolink", Route::Redirect("/article/nolink")),
        (
            "/article/nolink",
            Route::Html(landing_page(&["/about", "/supplementary.zip"])),
        ),
    ]);
    let temp = tempfile::tempdir().unwrap();
    let save_dir = temp.path().join("papers");
    let app = app(
        &save_dir,
        shell_tool("echo 'paper not found' >&2; exit 1"),
        Duration::from_secs(10),
        &base,
    );

    let result = app
        .run(&one_row("10.1000/nolink"), &options(), &CancelFlag::new(), &JsonOutput)
        .unwrap();

    let record = &result.records[0];
    assert_eq!(record.status, AcquisitionStatus::Failed);
    assert!(record.failure.as_deref().unwrap().contains("no PDF link found"));
    assert!(!save_dir.join("10.1000%2Fnolink.pdf").exists());
    assert_eq!(fs::read_dir(&save_dir).unwrap().count(), 0);
}

#[test]
fn broken_pdf_link_is_a_fetch_failure() {
    let base = serve(vec![(
        "/10.1000/gone",
        Route::Html(landing_page(&["/content/missing.pdf"])),
    )]);
    let temp = tempfile::tempdir().unwrap();
    let save_dir = temp.path().join("papers");
    let app = app(&save_dir, shell_tool("exit 3"), Duration::from_secs(10), &base);

    let result = app
        .run(&one_row("10.1000/gone"), &options(), &CancelFlag::new(), &JsonOutput)
        .unwrap();

    let record = &result.records[0];
    assert_eq!(record.status, AcquisitionStatus::Failed);
    assert!(record.failure.as_deref().unwrap().starts_with("PDF fetch failed"));
    assert!(record.failure.as_deref().unwrap().contains("404"));
    assert!(!save_dir.join("10.1000%2Fgone.pdf").exists());
}

#[test]
fn unreachable_resolver_is_a_resolution_failure() {
    let temp = tempfile::tempdir().unwrap();
    let save_dir = temp.path().join("papers");
    let app = app(
        &save_dir,
        shell_tool("exit 1"),
        Duration::from_secs(10),
        "http://127.0.0.1:9",
    );

    let result = app
        .run(&one_row("10.1/offline"), &options(), &CancelFlag::new(), &JsonOutput)
        .unwrap();

    let record = &result.records[0];
    assert_eq!(record.status, AcquisitionStatus::Failed);
    assert!(
        record
            .failure
            .as_deref()
            .unwrap()
            .starts_with("DOI resolution failed")
    );
}

#[test]
fn resolver_error_status_is_a_resolution_failure() {
    let base = serve(vec![]);
    let temp = tempfile::tempdir().unwrap();
    let doi: Doi = "10.1/x".parse().unwrap();
    let destination = temp.path().join(canonical_filename(doi.as_str()));
    let strategy = DirectResolutionStrategy::new(&base, None).unwrap();

    let outcome = strategy.acquire(&doi, &destination, Duration::from_secs(5));

    assert_matches!(
        outcome.failure_reason(),
        Some(AcquireError::ResolutionError(message)) if message.contains("404")
    );
    assert!(!destination.exists());
}

#[test]
fn silent_resolver_is_cut_off_by_the_timeout() {
    let base = serve_silently();
    let temp = tempfile::tempdir().unwrap();
    let doi: Doi = "10.1/hang".parse().unwrap();
    let destination = temp.path().join(canonical_filename(doi.as_str()));
    let strategy = DirectResolutionStrategy::new(&base, None).unwrap();

    let started = Instant::now();
    let outcome = strategy.acquire(&doi, &destination, Duration::from_millis(500));

    assert_matches!(outcome.failure_reason(), Some(AcquireError::ResolutionError(_)));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(!destination.exists());
}

fn occupy_with_directory(destination: &Path) {
    fs::create_dir_all(destination).unwrap();
    fs::write(destination.join("keep.txt"), b"occupied").unwrap();
}

#[test]
fn direct_download_onto_a_directory_is_a_placement_failure() {
    let base = serve(vec![
        ("/10.1/occupied", Route::Html(landing_page(&["/paper.pdf"]))),
        ("/paper.pdf", Route::Pdf(PDF_BYTES.to_vec())),
    ]);
    let temp = tempfile::tempdir().unwrap();
    let doi: Doi = "10.1/occupied".parse().unwrap();
    let destination = temp.path().join(canonical_filename(doi.as_str()));
    occupy_with_directory(&destination);
    let strategy = DirectResolutionStrategy::new(&base, None).unwrap();

    let outcome = strategy.acquire(&doi, &destination, Duration::from_secs(5));

    assert_matches!(outcome.failure_reason(), Some(AcquireError::PlacementError(_)));
    assert!(destination.join("keep.txt").is_file());
}

#[test]
fn tool_output_onto_a_directory_is_a_placement_failure() {
    let temp = tempfile::tempdir().unwrap();
    let save_dir = temp.path().join("papers");
    let doi: Doi = "10.1/occupied".parse().unwrap();
    let destination = save_dir.join(canonical_filename(doi.as_str()));
    occupy_with_directory(&destination);
    let strategy = ExternalToolStrategy::new(
        shell_tool(r#"printf '%%PDF-1.4' > "$1/paper.pdf""#),
        &save_dir,
    );

    let outcome = strategy.acquire(&doi, &destination, Duration::from_secs(10));

    assert_matches!(outcome.failure_reason(), Some(AcquireError::PlacementError(_)));
    assert!(destination.join("keep.txt").is_file());
    assert_eq!(leftover_scratch_dirs(&save_dir), 0);
}
