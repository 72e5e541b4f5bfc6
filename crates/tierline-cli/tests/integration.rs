#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn tierline(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("tierline").unwrap();
    cmd.current_dir(dir.path()).env("TIERLINE_ROOT", dir.path());
    cmd
}

fn init_project(dir: &TempDir) {
    tierline(dir).arg("init").assert().success();
}

fn create_account(dir: &TempDir, user_id: &str, email: Option<&str>) {
    let mut cmd = tierline(dir);
    cmd.args(["account", "create", user_id]);
    if let Some(email) = email {
        cmd.args(["--email", email]);
    }
    cmd.assert().success();
}

fn json_out(cmd: &mut Command) -> serde_json::Value {
    let out = cmd.arg("--json").output().unwrap();
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    serde_json::from_slice(&out.stdout).unwrap()
}

// ---------------------------------------------------------------------------
// tierline init
// ---------------------------------------------------------------------------

#[test]
fn init_creates_config_and_store() {
    let dir = TempDir::new().unwrap();
    tierline(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("created: .tierline/config.yaml"));

    assert!(dir.path().join(".tierline/config.yaml").exists());
    assert!(dir.path().join(".tierline/tierline.redb").exists());
}

#[test]
fn init_is_idempotent() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    tierline(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("exists:  .tierline/config.yaml"));
}

#[test]
fn commands_fail_before_init() {
    let dir = TempDir::new().unwrap();
    tierline(&dir)
        .args(["account", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error:"));
}

// ---------------------------------------------------------------------------
// tierline account
// ---------------------------------------------------------------------------

#[test]
fn account_create_show_and_list() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    tierline(&dir)
        .args(["account", "create", "alice", "--email", "alice@example.com"])
        .assert()
        .success()
        .stdout(predicate::str::contains("at tier free"));

    tierline(&dir)
        .args(["account", "show", "alice"])
        .assert()
        .success()
        .stdout(predicate::str::contains("alice@example.com"));

    let list = json_out(tierline(&dir).args(["account", "list"]));
    let accounts = list.as_array().unwrap();
    assert_eq!(accounts.len(), 1);
    assert_eq!(accounts[0]["user_id"], "alice");
    assert_eq!(accounts[0]["tier"], "free");
}

#[test]
fn account_create_duplicate_fails() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    create_account(&dir, "alice", None);
    tierline(&dir)
        .args(["account", "create", "alice"])
        .assert()
        .failure();
}

#[test]
fn account_show_unknown_fails() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    tierline(&dir)
        .args(["account", "show", "ghost"])
        .assert()
        .failure();
}

// ---------------------------------------------------------------------------
// tierline tier / override / check
// ---------------------------------------------------------------------------

#[test]
fn tier_set_can_lower_and_raise() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    create_account(&dir, "bob", None);

    tierline(&dir)
        .args(["tier", "set", "bob", "elite"])
        .assert()
        .success()
        .stdout(predicate::str::contains("free -> elite"));
    tierline(&dir)
        .args(["tier", "set", "bob", "premium"])
        .assert()
        .success();
    tierline(&dir)
        .args(["tier", "show", "bob"])
        .assert()
        .success()
        .stdout(predicate::str::diff("premium\n"));
}

#[test]
fn tier_set_rejects_unknown_tier() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    create_account(&dir, "bob", None);
    tierline(&dir)
        .args(["tier", "set", "bob", "platinum"])
        .assert()
        .failure();
}

#[test]
fn check_follows_tier_and_overrides() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    create_account(&dir, "carol", None);

    let denied = json_out(tierline(&dir).args(["check", "carol", "codex"]));
    assert_eq!(denied["allowed"], false);
    assert_eq!(denied["paywall"]["reason"], "upgrade_required");
    assert_eq!(denied["paywall"]["required_tier"], "premium");

    tierline(&dir)
        .args(["override", "grant", "carol", "codex"])
        .assert()
        .success();
    let allowed = json_out(tierline(&dir).args(["check", "carol", "codex"]));
    assert_eq!(allowed["allowed"], true);

    tierline(&dir)
        .args(["override", "revoke", "carol", "codex"])
        .assert()
        .success();
    tierline(&dir)
        .args(["check", "carol", "codex"])
        .assert()
        .success()
        .stdout(predicate::str::contains("denied: requires premium"));
}

#[test]
fn check_unknown_feature_is_denied() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    create_account(&dir, "dave", None);
    tierline(&dir).args(["tier", "set", "dave", "elite"]).assert().success();
    tierline(&dir)
        .args(["check", "dave", "teleport"])
        .assert()
        .success()
        .stdout(predicate::str::contains("not offered"));
}

#[test]
fn override_grant_unknown_feature_fails() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    create_account(&dir, "dave", None);
    tierline(&dir)
        .args(["override", "grant", "dave", "teleport"])
        .assert()
        .failure();
}

// ---------------------------------------------------------------------------
// tierline usage
// ---------------------------------------------------------------------------

#[test]
fn free_usage_stops_at_daily_limit() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    create_account(&dir, "erin", None);

    for remaining in [2, 1, 0] {
        let quota = json_out(tierline(&dir).args(["usage", "consume", "erin", "chat"]));
        assert_eq!(quota["allowed"], true);
        assert_eq!(quota["remaining"], remaining);
    }
    tierline(&dir)
        .args(["usage", "consume", "erin", "chat"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("daily limit reached"));

    let shown = json_out(tierline(&dir).args(["usage", "show", "erin"]));
    let chat = &shown["actions"][0];
    assert_eq!(chat["action"], "chat");
    assert_eq!(chat["quota"]["used"], 3);
    assert_eq!(chat["quota"]["allowed"], false);
}

#[test]
fn premium_usage_is_unlimited() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    create_account(&dir, "fay", None);
    tierline(&dir).args(["tier", "set", "fay", "premium"]).assert().success();

    for _ in 0..5 {
        tierline(&dir)
            .args(["usage", "consume", "fay", "chat"])
            .assert()
            .success()
            .stdout(predicate::str::contains("remaining unlimited"));
    }
}

#[test]
fn usage_show_rejects_bad_day() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    create_account(&dir, "gus", None);
    tierline(&dir)
        .args(["usage", "show", "gus", "--day", "yesterday"])
        .assert()
        .failure();
}

// ---------------------------------------------------------------------------
// tierline reconcile / history / revenue
// ---------------------------------------------------------------------------

fn write_event(dir: &TempDir, user_id: Option<&str>, amount: u64) -> std::path::PathBuf {
    let mut object = serde_json::json!({
        "id": "cs_cli_1",
        "object": "checkout.session",
        "amount_total": amount,
        "currency": "USD",
        "payment_status": "paid",
        "customer_details": { "email": "hank@example.com" },
    });
    if let Some(uid) = user_id {
        object["client_reference_id"] = serde_json::json!(uid);
    }
    let event = serde_json::json!({
        "id": "evt_cli_1",
        "type": "checkout.session.completed",
        "created": 1_760_000_000,
        "data": { "object": object },
    });
    let path = dir.path().join("event.json");
    std::fs::write(&path, serde_json::to_vec(&event).unwrap()).unwrap();
    path
}

#[test]
fn reconcile_applies_once_and_records_history() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    create_account(&dir, "hank", None);
    let event = write_event(&dir, Some("hank"), 4999);

    tierline(&dir)
        .arg("reconcile")
        .arg(&event)
        .assert()
        .success()
        .stdout(predicate::str::contains("reconciled: hank -> elite"));
    tierline(&dir)
        .arg("reconcile")
        .arg(&event)
        .assert()
        .success()
        .stdout(predicate::str::contains("already processed"));

    let history = json_out(tierline(&dir).args(["history", "hank"]));
    assert_eq!(history.as_array().unwrap().len(), 1);
    assert_eq!(history[0]["tier"], "elite");

    let revenue = json_out(tierline(&dir).arg("revenue"));
    assert_eq!(revenue[0]["amount_total"], 4999);
    assert_eq!(revenue[0]["payments"], 1);
    assert_eq!(revenue[0]["currency"], "usd");
}

#[test]
fn reconcile_user_flag_attributes_anonymous_payment() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    create_account(&dir, "ivy", None);
    let event = write_event(&dir, None, 1999);

    tierline(&dir).arg("reconcile").arg(&event).assert().failure();
    tierline(&dir)
        .arg("reconcile")
        .arg(&event)
        .args(["--user", "ivy"])
        .assert()
        .success();
    tierline(&dir)
        .args(["tier", "show", "ivy"])
        .assert()
        .success()
        .stdout(predicate::str::diff("premium\n"));
}

// ---------------------------------------------------------------------------
// tierline config
// ---------------------------------------------------------------------------

#[test]
fn config_validate_default_is_clean() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    tierline(&dir)
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Config is valid"));
}

#[test]
fn config_validate_flags_unsold_tier() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let path = dir.path().join(".tierline/config.yaml");
    let mut config: serde_yaml::Value =
        serde_yaml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    config["pricing"]
        .as_mapping_mut()
        .unwrap()
        .remove(serde_yaml::Value::from("elite"));
    std::fs::write(&path, serde_yaml::to_string(&config).unwrap()).unwrap();

    tierline(&dir)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("[error]"));
}
