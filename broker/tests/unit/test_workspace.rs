//! Workspace materialization and teardown

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use tfbroker::deploy::command::Command;
use tfbroker::deploy::executor::{ExecutionOutput, Invocation, TerraformExecutor};
use tfbroker::errors::{BrokerError, Result};
use tfbroker::models::context::RequestContext;
use tfbroker::workspace::Workspace;

use crate::support::{state, PROVISION_TEMPLATE};

/// Files under `dir`, relative and sorted
fn list_files(dir: &Path) -> Vec<String> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in std::fs::read_dir(&current).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                pending.push(path);
            } else {
                files.push(path.strip_prefix(dir).unwrap().display().to_string());
            }
        }
    }
    files.sort();
    files
}

/// Looks at the working directory and optionally leaves files behind
#[derive(Default)]
struct Inspector {
    dirs: Mutex<Vec<PathBuf>>,
    files: Mutex<Vec<Vec<String>>>,
    instance_json: Mutex<Option<Value>>,
    write_back: Vec<(String, Vec<u8>)>,
    fail: bool,
}

#[async_trait]
impl TerraformExecutor for Inspector {
    async fn execute(&self, _ctx: &RequestContext, invocation: Invocation) -> Result<ExecutionOutput> {
        let dir = invocation.dir.clone();
        self.dirs.lock().unwrap().push(dir.clone());
        self.files.lock().unwrap().push(list_files(&dir));

        if let Ok(text) = std::fs::read(dir.join("instance.tf.json")) {
            *self.instance_json.lock().unwrap() = Some(serde_json::from_slice(&text).unwrap());
        }
        for (name, contents) in &self.write_back {
            std::fs::write(dir.join(name), contents)?;
        }

        if self.fail {
            return Err(BrokerError::Execution {
                message: "Error: boom exit status 1".to_string(),
                exit_code: Some(1),
            });
        }
        Ok(ExecutionOutput {
            stdout: invocation.args.join(" "),
            stderr: String::new(),
        })
    }
}

fn workspace() -> Workspace {
    let vars = json!({"name": "db"});
    Workspace::new(
        vars.as_object().unwrap(),
        PROVISION_TEMPLATE,
        &BTreeMap::new(),
        Vec::new(),
        Vec::new(),
        Vec::new(),
    )
    .unwrap()
}

#[tokio::test]
async fn test_modules_layout_and_state_capture() {
    let mut ws = workspace();
    ws.state = Some(state("1.6.0", Map::new()));
    ws.additional_state.insert("ca.pem".to_string(), b"old cert".to_vec());

    let new_state = state("1.6.1", Map::new());
    let executor = Inspector {
        write_back: vec![
            ("terraform.tfstate".to_string(), new_state.clone()),
            ("client.pem".to_string(), b"client cert".to_vec()),
        ],
        ..Default::default()
    };

    let output = ws
        .execute(&RequestContext::new(), &executor, &[Command::Apply, Command::Show])
        .await
        .unwrap();
    assert_eq!(output.stdout, "show -no-color");

    let files = executor.files.lock().unwrap()[0].clone();
    assert_eq!(
        files,
        vec![
            "brokertemplate/definition.tf",
            "ca.pem",
            "instance.tf.json",
            "terraform.tfstate",
        ]
    );

    let instance = executor.instance_json.lock().unwrap().clone().unwrap();
    assert_eq!(instance["module"]["instance"]["source"], json!("./brokertemplate"));
    assert_eq!(instance["module"]["instance"]["name"], json!("db"));
    assert_eq!(
        instance["output"]["status"]["value"],
        json!("${module.instance.status}")
    );

    assert_eq!(ws.state.as_deref(), Some(new_state.as_slice()));
    assert_eq!(ws.additional_state["client.pem"], b"client cert".to_vec());
    assert_eq!(ws.additional_state["ca.pem"], b"old cert".to_vec());

    // Both commands ran in the same directory, which is gone now
    let dirs = executor.dirs.lock().unwrap().clone();
    assert_eq!(dirs.len(), 2);
    assert_eq!(dirs[0], dirs[1]);
    assert!(!dirs[0].exists());
}

#[tokio::test]
async fn test_flat_layout() {
    let mut ws = Workspace::new(
        json!({"name": "db"}).as_object().unwrap(),
        "",
        &BTreeMap::from([("main".to_string(), PROVISION_TEMPLATE.to_string())]),
        Vec::new(),
        Vec::new(),
        Vec::new(),
    )
    .unwrap();
    let executor = Inspector::default();

    ws.execute(&RequestContext::new(), &executor, &[Command::Plan])
        .await
        .unwrap();

    let files = executor.files.lock().unwrap()[0].clone();
    assert_eq!(files, vec!["main.tf", "terraform.tfvars.json"]);
    assert!(ws.state.is_none());
}

#[tokio::test]
async fn test_failure_still_tears_down() {
    let mut ws = workspace();
    let written = state("1.6.0", Map::new());
    let executor = Inspector {
        write_back: vec![("terraform.tfstate".to_string(), written.clone())],
        fail: true,
        ..Default::default()
    };

    let err = ws
        .execute(&RequestContext::new(), &executor, &[Command::Apply, Command::Show])
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Error: boom exit status 1");

    // Stops at the first failing command
    assert_eq!(executor.dirs.lock().unwrap().len(), 1);
    assert!(!executor.dirs.lock().unwrap()[0].exists());
    // Partial state from a failed apply is kept
    assert_eq!(ws.state.as_deref(), Some(written.as_slice()));
}

/// Counts overlapping executions
#[derive(Default)]
struct Overlap {
    active: AtomicUsize,
    max_active: AtomicUsize,
}

#[async_trait]
impl TerraformExecutor for Overlap {
    async fn execute(&self, _ctx: &RequestContext, _invocation: Invocation) -> Result<ExecutionOutput> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(ExecutionOutput::default())
    }
}

#[tokio::test]
async fn test_clones_share_the_directory_lock() {
    let mut first = workspace();
    let mut second = first.clone();
    let executor = Overlap::default();
    let ctx = RequestContext::new();

    let (a, b) = futures::future::join(
        first.execute(&ctx, &executor, &[Command::Apply]),
        second.execute(&ctx, &executor, &[Command::Apply]),
    )
    .await;
    a.unwrap();
    b.unwrap();

    assert_eq!(executor.max_active.load(Ordering::SeqCst), 1);
}
