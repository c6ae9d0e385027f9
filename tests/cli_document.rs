use predicates::prelude::*;
use tempfile::TempDir;

fn scholargen(data_dir: &TempDir) -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("scholargen");
    cmd.env_remove("OPENAI_API_KEY")
        .env_remove("SCHOLARGEN_DATA_DIR")
        .arg("--data-dir")
        .arg(data_dir.path());
    cmd
}

fn stdout_json(output: &std::process::Output) -> anyhow::Result<serde_json::Value> {
    Ok(serde_json::from_slice(&output.stdout)?)
}

fn create_document(data_dir: &TempDir, references: &[&str]) -> anyhow::Result<String> {
    let mut cmd = scholargen(data_dir);
    cmd.args([
        "document",
        "create",
        "--user",
        "user-1",
        "--title",
        "Photosynthesis",
        "--topic",
        "Photosynthesis basics",
    ]);
    for reference in references {
        cmd.args(["--reference", reference]);
    }
    let output = cmd.assert().success().get_output().clone();
    let document = stdout_json(&output)?;
    assert_eq!(document["status"], "draft");
    let id = document["id"]
        .as_str()
        .ok_or_else(|| anyhow::anyhow!("document id missing"))?;
    Ok(id.to_owned())
}

#[test]
fn created_document_reports_draft_progress() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let id = create_document(&temp, &["Taiz, Plant Physiology"])?;

    let output = scholargen(&temp)
        .args(["document", "status", &id])
        .assert()
        .success()
        .get_output()
        .clone();
    let report = stdout_json(&output)?;
    assert_eq!(report["status"], "draft");
    assert_eq!(report["is_generating"], false);
    assert_eq!(report["has_references"], true);
    assert_eq!(report["completion_percentage"], 17);
    assert_eq!(report["job"]["status"], "not_found");
    Ok(())
}

#[test]
fn blank_topic_is_rejected() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    scholargen(&temp)
        .args([
            "document", "create", "--user", "user-1", "--title", "T", "--topic", "  ",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("topic is required"));
    Ok(())
}

#[test]
fn base_generation_enqueues_a_job() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let id = create_document(&temp, &[])?;

    let output = scholargen(&temp)
        .args(["generate", "base", &id])
        .assert()
        .success()
        .get_output()
        .clone();
    assert_eq!(stdout_json(&output)?["status"], "pre_generating");

    let output = scholargen(&temp)
        .args(["jobs", "status", &id])
        .assert()
        .success()
        .get_output()
        .clone();
    let job = stdout_json(&output)?;
    assert_eq!(job["status"], "processing");
    assert_eq!(job["job_type"], "structure");

    scholargen(&temp)
        .args(["generate", "base", &id])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already active"));

    let output = scholargen(&temp)
        .args(["jobs", "delete", &id])
        .assert()
        .success()
        .get_output()
        .clone();
    assert_eq!(stdout_json(&output)?["active"], 1);

    let output = scholargen(&temp)
        .args(["document", "status", &id])
        .assert()
        .success()
        .get_output()
        .clone();
    let report = stdout_json(&output)?;
    assert_eq!(report["status"], "pre_generation_failed");
    assert_eq!(report["can_start_base_generation"], true);
    Ok(())
}

#[test]
fn full_generation_from_draft_is_refused_without_charge() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let id = create_document(&temp, &["ref"])?;
    scholargen(&temp)
        .args(["ledger", "credit", "--user", "user-1", "--amount", "250"])
        .assert()
        .success();

    scholargen(&temp)
        .args(["generate", "full", &id, "--price", "100"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot move document"));

    let output = scholargen(&temp)
        .args(["ledger", "balance", "--user", "user-1"])
        .assert()
        .success()
        .get_output()
        .clone();
    let balance = stdout_json(&output)?;
    assert_eq!(balance["user_id"], "user-1");
    assert_eq!(balance["balance"], 250);
    Ok(())
}

#[test]
fn unknown_document_fails() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    scholargen(&temp)
        .args(["document", "show", "00000000-0000-4000-8000-000000000000"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("document not found"));
    Ok(())
}

#[test]
fn rust_log_debug_emits_debug_line_to_stderr() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    scholargen(&temp)
        .env("RUST_LOG", "debug")
        .args(["ledger", "balance", "--user", "user-1"])
        .assert()
        .success()
        .stderr(predicate::str::contains("parsed cli"));
    Ok(())
}
