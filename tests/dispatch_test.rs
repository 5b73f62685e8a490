//! End-to-end dispatcher tests against an in-memory platform.
//!
//! Each test gets its own temp directory holding the global config file and
//! the working directory, plus injected environment variables, so nothing
//! touches the real home directory or network.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use rstest::rstest;
use serde_json::Value;
use tempfile::TempDir;

use psdb::cli::run;
use psdb::config::{ConfigLayer, Resolver, PROJECT_CONFIG_FILE};
use psdb::domain::BackupState;
use psdb::exitcode;
use psdb::infrastructure::ServiceContainer;
use psdb::util::testing::{init_test_setup, FakeFactory, FakePlatform, SharedBuffer};

struct Harness {
    _dir: TempDir,
    global: PathBuf,
    work: PathBuf,
    platform: Arc<FakePlatform>,
    factory: Arc<FakeFactory>,
    out: SharedBuffer,
    err: SharedBuffer,
    token: bool,
}

impl Harness {
    fn new(platform: FakePlatform) -> Self {
        init_test_setup();
        let dir = TempDir::new().unwrap();
        let global = dir.path().join("config").join("psdb.toml");
        let work = dir.path().join("work");
        fs::create_dir_all(&work).unwrap();
        let platform = Arc::new(platform);
        let factory = Arc::new(FakeFactory::new(platform.clone()));
        Self {
            _dir: dir,
            global,
            work,
            platform,
            factory,
            out: SharedBuffer::default(),
            err: SharedBuffer::default(),
            token: true,
        }
    }

    fn without_token(mut self) -> Self {
        self.token = false;
        self
    }

    fn container(&self) -> ServiceContainer {
        let mut vars = config::Map::new();
        if self.token {
            vars.insert("PSDB_ACCESS_TOKEN".to_string(), "pscale_tkn_test".to_string());
        }
        let resolver = Resolver::new(Some(self.global.clone()), &self.work).with_env(vars);
        ServiceContainer::with_deps(
            resolver,
            self.factory.clone(),
            Box::new(self.out.clone()),
            Box::new(self.err.clone()),
        )
    }

    async fn run(&self, args: &[&str]) -> i32 {
        self.run_with(self.container(), args).await
    }

    async fn run_with(&self, container: ServiceContainer, args: &[&str]) -> i32 {
        let argv = std::iter::once("psdb").chain(args.iter().copied());
        run(argv, container).await
    }

    fn stdout(&self) -> String {
        self.out.contents()
    }

    fn stderr(&self) -> String {
        self.err.contents()
    }

    fn json(&self) -> Value {
        serde_json::from_str(&self.stdout()).unwrap_or_else(|e| {
            panic!("stdout is not JSON ({e}):\n{}", self.stdout());
        })
    }

    fn project_file(&self) -> PathBuf {
        self.work.join(PROJECT_CONFIG_FILE)
    }
}

fn platform() -> FakePlatform {
    FakePlatform::new("acme").with_branch("app", "main")
}

// ============================================================
// Usage errors
// ============================================================

#[rstest]
#[case(&["backup", "create", "app"])]
#[case(&["branch", "switch"])]
#[case(&["backup", "create", "app", "main", "--bogus"])]
#[case(&["backup", "create", "app", "main", "--wait", "--timeout", "soon"])]
#[case(&["data-imports", "make-primary"])]
#[case(&["backup", "create", "app", "main", "--wait", "--timeout", "0"])]
#[case(&["backup", "create", "app", "main", "--wait", "--interval", "0"])]
#[case(&["backup", "create", "app", "main", "--wait", "--timeout", "18446744073709551615"])]
#[tokio::test]
async fn given_invalid_invocation_when_dispatching_then_usage_error_and_no_calls(
    #[case] args: &[&str],
) {
    let h = Harness::new(platform());
    let mut argv = vec!["--org", "acme"];
    argv.extend_from_slice(args);

    let code = h.run(&argv).await;

    assert_eq!(code, exitcode::USAGE);
    assert!(h.platform.calls().is_empty());
    assert_eq!(h.factory.connects(), 0);
    assert!(!h.stderr().is_empty());
}

#[tokio::test]
async fn given_help_flag_when_dispatching_then_success_on_stdout() {
    let h = Harness::new(platform());

    let code = h.run(&["backup", "--help"]).await;

    assert_eq!(code, exitcode::OK);
    assert!(h.stdout().contains("create"), "{}", h.stdout());
}

// ============================================================
// Backup create
// ============================================================

#[tokio::test]
async fn given_missing_branch_when_creating_backup_then_not_found_message() {
    let h = Harness::new(platform());

    let code = h
        .run(&["--org", "acme", "backup", "create", "app", "dev"])
        .await;

    assert_eq!(code, exitcode::NOINPUT);
    assert!(
        h.stderr()
            .contains("branch dev does not exist in database app (organization: acme)"),
        "{}",
        h.stderr()
    );
    assert_eq!(h.platform.calls(), vec!["create_backup:app/dev"]);
}

#[tokio::test]
async fn given_alias_when_creating_backup_then_backup_is_started() {
    let h = Harness::new(platform());

    let code = h
        .run(&["--org", "acme", "backup", "b", "app", "main", "--name", "nightly"])
        .await;

    assert_eq!(code, exitcode::OK, "{}", h.stderr());
    assert!(h.stdout().contains("Backup nightly was successfully started"));
}

#[tokio::test(start_paused = true)]
async fn given_wait_when_backup_succeeds_then_polls_until_done() {
    let h = Harness::new(platform().with_backup_states([
        BackupState::Running,
        BackupState::Running,
        BackupState::Success,
    ]));

    let code = h
        .run(&[
            "--org", "acme", "backup", "create", "app", "main", "--wait", "--interval", "1",
        ])
        .await;

    assert_eq!(code, exitcode::OK, "{}", h.stderr());
    let polls = h
        .platform
        .calls()
        .iter()
        .filter(|c| c.starts_with("get_backup:"))
        .count();
    assert_eq!(polls, 3);
    assert!(h.stdout().contains("successfully completed"));
}

#[rstest]
#[case(BackupState::Failed)]
#[case(BackupState::Canceled)]
#[tokio::test(start_paused = true)]
async fn given_wait_when_backup_ends_unsuccessfully_then_operation_failed(
    #[case] terminal: BackupState,
) {
    let h = Harness::new(platform().with_backup_states([BackupState::Running, terminal]));

    let code = h
        .run(&[
            "--org", "acme", "backup", "create", "app", "main", "--wait", "--interval", "1",
        ])
        .await;

    assert_eq!(code, exitcode::SOFTWARE);
    assert!(h.stderr().contains(&terminal.to_string()), "{}", h.stderr());
}

#[tokio::test]
async fn given_wait_when_deadline_passes_then_timeout() {
    let h = Harness::new(platform().with_backup_states([BackupState::Running]));

    let code = h
        .run(&[
            "--org", "acme", "backup", "create", "app", "main", "--wait", "--timeout", "1",
            "--interval", "2",
        ])
        .await;

    assert_eq!(code, exitcode::TEMPFAIL);
    assert!(h.stderr().contains("still running"), "{}", h.stderr());
}

#[tokio::test]
async fn given_cancelled_token_when_dispatching_then_interrupted_without_calls() {
    let h = Harness::new(platform());
    let container = h.container();
    container.cancel_token().cancel();

    let code = h
        .run_with(container, &["--org", "acme", "backup", "create", "app", "main"])
        .await;

    assert_eq!(code, exitcode::INTERRUPTED);
    assert!(h.platform.calls().is_empty());
}

// ============================================================
// Branch switch
// ============================================================

#[tokio::test]
async fn given_missing_branch_without_create_when_switching_then_usage_and_no_write() {
    let h = Harness::new(platform());

    let code = h
        .run(&["--org", "acme", "--database", "app", "branch", "switch", "dev"])
        .await;

    assert_eq!(code, exitcode::USAGE);
    assert!(h.stderr().contains("--create"), "{}", h.stderr());
    assert!(!h.project_file().exists());
    assert!(!h.platform.has_branch("app", "dev"));
}

#[tokio::test]
async fn given_missing_branch_with_create_when_switching_then_creates_and_writes_project_config() {
    let h = Harness::new(platform());

    let code = h
        .run(&[
            "--org",
            "acme",
            "--database",
            "app",
            "branch",
            "switch",
            "dev",
            "--create",
            "--parent-branch",
            "main",
        ])
        .await;

    assert_eq!(code, exitcode::OK, "{}", h.stderr());
    let created = h.platform.branch("app", "dev").unwrap();
    assert_eq!(created.parent_branch.as_deref(), Some("main"));

    let written: ConfigLayer = toml::from_str(&fs::read_to_string(h.project_file()).unwrap()).unwrap();
    assert_eq!(
        written,
        ConfigLayer {
            database: Some("app".into()),
            branch: Some("dev".into()),
            ..Default::default()
        }
    );
    assert!(h
        .stdout()
        .contains("Successfully switched to branch dev on database app"));
}

#[tokio::test]
async fn given_existing_branch_when_switching_then_project_config_replaced() {
    let h = Harness::new(platform().with_branch("app", "staging"));
    fs::write(h.project_file(), "database = \"old\"\nbranch = \"old\"\norg = \"x\"\n").unwrap();

    let code = h
        .run(&["--org", "acme", "--database", "app", "branch", "switch", "staging"])
        .await;

    assert_eq!(code, exitcode::OK, "{}", h.stderr());
    let written: ConfigLayer = toml::from_str(&fs::read_to_string(h.project_file()).unwrap()).unwrap();
    assert_eq!(written.database.as_deref(), Some("app"));
    assert_eq!(written.branch.as_deref(), Some("staging"));
    assert_eq!(written.org, None);
    assert!(!h.platform.calls().iter().any(|c| c.starts_with("create_branch")));
}

#[tokio::test]
async fn given_switch_without_database_when_dispatching_then_config_error_before_calls() {
    let h = Harness::new(platform());

    let code = h.run(&["--org", "acme", "branch", "switch", "dev"]).await;

    assert_eq!(code, exitcode::CONFIG);
    assert!(h.stderr().contains("`database`"), "{}", h.stderr());
    assert!(h.platform.calls().is_empty());
}

// ============================================================
// Credentials and configuration
// ============================================================

#[tokio::test]
async fn given_no_token_in_any_layer_when_dispatching_then_auth_error_before_network() {
    let h = Harness::new(platform()).without_token();

    let code = h.run(&["--org", "acme", "database", "list"]).await;

    assert_eq!(code, exitcode::NOPERM);
    assert_eq!(h.factory.connects(), 0);
    assert!(h.platform.calls().is_empty());
    assert!(h.stderr().contains("access token"), "{}", h.stderr());
}

#[tokio::test]
async fn given_no_org_when_dispatching_remote_command_then_config_error() {
    let h = Harness::new(platform());

    let code = h.run(&["database", "list"]).await;

    assert_eq!(code, exitcode::CONFIG);
    assert!(h.stderr().contains("--org"), "{}", h.stderr());
    assert!(h.platform.calls().is_empty());
}

#[tokio::test]
async fn given_org_in_global_file_when_dispatching_then_used() {
    let h = Harness::new(platform());
    fs::create_dir_all(h.global.parent().unwrap()).unwrap();
    fs::write(&h.global, "org = \"acme\"\n").unwrap();

    let code = h.run(&["branch", "list", "app"]).await;

    assert_eq!(code, exitcode::OK, "{}", h.stderr());
    assert!(h.stdout().contains("main"));
}

#[tokio::test]
async fn given_platform_rejects_token_when_dispatching_then_unauthorized_exit_code() {
    let h = Harness::new(platform().failing_with(401, "unauthorized"));

    let code = h.run(&["--org", "acme", "database", "show", "app"]).await;

    assert_eq!(code, exitcode::NOPERM);
    assert!(h.stderr().contains("not authorized"), "{}", h.stderr());
}

#[tokio::test]
async fn given_org_switch_when_dispatching_then_global_file_keeps_other_keys() {
    let h = Harness::new(platform());
    fs::create_dir_all(h.global.parent().unwrap()).unwrap();
    fs::write(&h.global, "access_token = \"tkn\"\norg = \"old\"\n").unwrap();

    let code = h.run(&["org", "switch", "acme"]).await;

    assert_eq!(code, exitcode::OK, "{}", h.stderr());
    let layer: ConfigLayer = toml::from_str(&fs::read_to_string(&h.global).unwrap()).unwrap();
    assert_eq!(layer.org.as_deref(), Some("acme"));
    assert_eq!(layer.access_token.as_deref(), Some("tkn"));
}

#[tokio::test]
async fn given_config_show_when_token_set_then_token_is_redacted() {
    let h = Harness::new(platform());

    let code = h.run(&["--output", "json", "config", "show"]).await;

    assert_eq!(code, exitcode::OK);
    let doc = h.json();
    assert_eq!(doc["access_token"], "<redacted>");
    assert!(!h.stdout().contains("pscale_tkn_test"));
}

// ============================================================
// Data imports
// ============================================================

#[tokio::test]
async fn given_unknown_import_when_making_primary_then_not_found_message() {
    let h = Harness::new(platform());

    let code = h
        .run(&["--org", "acme", "data-imports", "s", "--name", "app"])
        .await;

    assert_eq!(code, exitcode::NOINPUT);
    assert!(
        h.stderr()
            .contains("unable to switch database app to primary"),
        "{}",
        h.stderr()
    );
}

#[tokio::test]
async fn given_running_import_when_making_primary_then_success() {
    let h = Harness::new(platform().with_data_import("app", "ready"));

    let code = h
        .run(&["--org", "acme", "data-imports", "make-primary", "--name", "app"])
        .await;

    assert_eq!(code, exitcode::OK, "{}", h.stderr());
    assert_eq!(h.platform.calls(), vec!["make_primary:app"]);
}

// ============================================================
// Machine-readable output
// ============================================================

#[tokio::test]
async fn given_json_mode_when_listing_then_stdout_is_one_sorted_document() {
    let h = Harness::new(platform().with_branch("app", "dev"));

    let code = h
        .run(&["--output", "json", "--org", "acme", "branch", "list", "app"])
        .await;

    assert_eq!(code, exitcode::OK);
    let doc = h.json();
    let names: Vec<&str> = doc
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["dev", "main"]);

    let text = h.stdout();
    let created = text.find("\"created_at\"").unwrap();
    let name = text.find("\"name\"").unwrap();
    assert!(created < name, "keys not sorted:\n{text}");
    assert!(h.stderr().is_empty(), "{}", h.stderr());
}

#[tokio::test]
async fn given_json_mode_when_switching_then_no_chatter_on_stdout() {
    let h = Harness::new(platform());

    let code = h
        .run(&[
            "--output", "json", "--org", "acme", "--database", "app", "branch", "switch", "dev",
            "--create",
        ])
        .await;

    assert_eq!(code, exitcode::OK, "{}", h.stdout());
    let doc = h.json();
    assert_eq!(doc["created"], true);
    assert_eq!(doc["branch"]["name"], "dev");
    assert!(!h.stdout().contains("Finding branch"));
}

#[tokio::test]
async fn given_json_mode_when_command_fails_then_error_document_on_stdout() {
    let h = Harness::new(platform());

    let code = h
        .run(&["--output", "json", "--org", "acme", "backup", "create", "app", "dev"])
        .await;

    assert_eq!(code, exitcode::NOINPUT);
    let doc = h.json();
    assert_eq!(doc["kind"], "not_found");
    assert_eq!(doc["exit_code"], exitcode::NOINPUT);
    assert!(doc["message"].as_str().unwrap().contains("branch dev does not exist"));
    assert!(h.stderr().is_empty());
}

#[tokio::test]
async fn given_global_flags_on_backup_create_when_dispatching_then_positionals_win() {
    let h = Harness::new(platform());

    let code = h
        .run(&[
            "--org", "acme", "backup", "create", "app", "main", "--database", "other", "--branch",
            "elsewhere",
        ])
        .await;

    assert_eq!(code, exitcode::OK, "{}", h.stderr());
    assert!(
        h.platform.calls().iter().any(|c| c == "create_backup:app/main"),
        "{:?}",
        h.platform.calls()
    );
}

#[tokio::test]
async fn given_branch_flag_on_switch_when_dispatching_then_accepted() {
    let h = Harness::new(platform().with_branch("app", "dev"));

    let code = h
        .run(&["--org", "acme", "--database", "app", "branch", "switch", "dev", "--branch", "x"])
        .await;

    assert_eq!(code, exitcode::OK, "{}", h.stderr());
    let written = fs::read_to_string(h.project_file()).unwrap();
    assert!(written.contains("\"dev\""), "{written}");
}

#[rstest]
#[case(&["--output", "json", "backup", "create", "app"])]
#[case(&["backup", "create", "app", "--output=json"])]
#[case(&["--output", "json", "backup", "create", "app", "main", "--wait", "--timeout", "0"])]
#[tokio::test]
async fn given_json_mode_when_arguments_invalid_then_usage_document_on_stdout(
    #[case] args: &[&str],
) {
    let h = Harness::new(platform());

    let code = h.run(args).await;

    assert_eq!(code, exitcode::USAGE);
    let doc = h.json();
    assert_eq!(doc["kind"], "usage");
    assert_eq!(doc["exit_code"], exitcode::USAGE);
    assert!(!doc["message"].as_str().unwrap().is_empty());
    assert!(h.stderr().is_empty(), "{}", h.stderr());
    assert_eq!(h.factory.connects(), 0);
}

#[tokio::test]
async fn given_output_json_in_env_when_arguments_invalid_then_usage_document_on_stdout() {
    let h = Harness::new(platform());
    let mut vars = config::Map::new();
    vars.insert("PSDB_OUTPUT".to_string(), "json".to_string());
    let resolver = Resolver::new(Some(h.global.clone()), &h.work).with_env(vars);
    let container = ServiceContainer::with_deps(
        resolver,
        h.factory.clone(),
        Box::new(h.out.clone()),
        Box::new(h.err.clone()),
    );

    let code = h.run_with(container, &["branch", "switch"]).await;

    assert_eq!(code, exitcode::USAGE);
    assert_eq!(h.json()["kind"], "usage");
}

#[tokio::test]
async fn given_output_json_in_env_when_dispatching_then_json_mode() {
    let h = Harness::new(platform());
    let mut vars = config::Map::new();
    vars.insert("PSDB_ACCESS_TOKEN".to_string(), "t".to_string());
    vars.insert("PSDB_OUTPUT".to_string(), "json".to_string());
    vars.insert("PSDB_ORG".to_string(), "acme".to_string());
    let resolver = Resolver::new(Some(h.global.clone()), &h.work).with_env(vars);
    let container = ServiceContainer::with_deps(
        resolver,
        h.factory.clone(),
        Box::new(h.out.clone()),
        Box::new(h.err.clone()),
    );

    let code = h.run_with(container, &["org", "show"]).await;

    assert_eq!(code, exitcode::OK);
    assert_eq!(h.json()["org"], "acme");
}
