use std::path::Path;
use std::process::{Command, Output};

fn codesense(cwd: &Path, index_dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_codesense"))
        .args(args)
        .arg("--index-dir")
        .arg(index_dir)
        .current_dir(cwd)
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

fn stdout(output: &Output) -> String {
    assert!(
        output.status.success(),
        "codesense failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn sample_repo(root: &Path) {
    std::fs::write(
        root.join("shop.py"),
        "class Order(models.Model):\n    total = 0\n\n\ndef refund_order(order):\n    \"\"\"Refund an order.\"\"\"\n    return order.total\n",
    )
    .unwrap();
}

#[test]
fn init_creates_valid_toml() {
    let dir = tempfile::tempdir().unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_codesense"))
        .arg("init")
        .current_dir(dir.path())
        .output()
        .unwrap();

    assert!(output.status.success(), "codesense init failed: {}", String::from_utf8_lossy(&output.stderr));

    let content = std::fs::read_to_string(dir.path().join(".codesense.toml")).unwrap();
    assert!(content.contains("[embedding]"));
    assert!(content.contains("[search]"));

    let config: codesense_core::CodesenseConfig = toml::from_str(&content).unwrap();
    assert_eq!(config.search.default_top_k, 5);
}

#[test]
fn init_refuses_if_exists() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(".codesense.toml"), "# existing").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_codesense"))
        .arg("init")
        .current_dir(dir.path())
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert_eq!(
        std::fs::read_to_string(dir.path().join(".codesense.toml")).unwrap(),
        "# existing"
    );
}

#[test]
fn index_search_list_info_delete() {
    let repo = tempfile::tempdir().unwrap();
    let indexes = tempfile::tempdir().unwrap();
    sample_repo(repo.path());
    let repo_arg = repo.path().to_str().unwrap();

    let out = stdout(&codesense(repo.path(), indexes.path(), &["index", repo_arg, "--name", "shop"]));
    assert!(out.contains("Indexed 'shop'"), "{out}");

    let out = stdout(&codesense(
        repo.path(),
        indexes.path(),
        &["search", "refund an order", "--index", "shop", "--no-intent", "--format", "json"],
    ));
    let outcome: serde_json::Value = serde_json::from_str(&out).unwrap();
    let results = outcome["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["rank"], 1);
    assert_eq!(results[0]["filePath"], "shop.py");

    let out = stdout(&codesense(
        repo.path(),
        indexes.path(),
        &["search", "order", "--index", "shop", "--kind", "class", "--format", "json"],
    ));
    let outcome: serde_json::Value = serde_json::from_str(&out).unwrap();
    let results = outcome["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["chunk"]["frameworkTag"], "django_model");

    let out = stdout(&codesense(repo.path(), indexes.path(), &["update", "shop"]));
    assert!(out.contains("up to date"), "{out}");

    let out = stdout(&codesense(repo.path(), indexes.path(), &["list", "--format", "json"]));
    let names: Vec<String> = serde_json::from_str(&out).unwrap();
    assert_eq!(names, vec!["shop"]);

    let out = stdout(&codesense(repo.path(), indexes.path(), &["info", "shop", "--format", "json"]));
    let info: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(info["numFiles"], 1);
    assert_eq!(info["numChunks"], 2);
    assert_eq!(info["modelId"], "hashing-384");

    let refused = codesense(repo.path(), indexes.path(), &["delete", "shop"]);
    assert!(!refused.status.success());

    stdout(&codesense(repo.path(), indexes.path(), &["delete", "shop", "--yes"]));
    let out = stdout(&codesense(repo.path(), indexes.path(), &["list"]));
    assert!(out.contains("No indexes found."), "{out}");
}

#[test]
fn errors_exit_non_zero() {
    let dir = tempfile::tempdir().unwrap();
    let indexes = tempfile::tempdir().unwrap();

    let missing = codesense(dir.path(), indexes.path(), &["search", "users", "--index", "nope"]);
    assert!(!missing.status.success());
    assert!(String::from_utf8_lossy(&missing.stderr).contains("nope"));

    let blank = codesense(dir.path(), indexes.path(), &["search", "  ", "--index", "nope"]);
    assert!(!blank.status.success());

    let bad_name = codesense(dir.path(), indexes.path(), &["index", ".", "--name", "../escape"]);
    assert!(!bad_name.status.success());
}
