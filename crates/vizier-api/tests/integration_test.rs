// Integration tests for the Vizier API.
//
// These exercise a running `vizier-api` process end to end and are
// `#[ignore]`d by default, the way the teacher's own API integration
// tests are: `cargo test --test integration_test -- --ignored` against
// `cargo run -p vizier-api`.

use serde_json::json;
use vizier_core::{Module, Workflow};

const API_BASE_URL: &str = "http://localhost:9100";

#[tokio::test]
#[ignore]
async fn test_create_append_and_fetch_module() {
    let client = reqwest::Client::new();

    let project: serde_json::Value = client
        .post(format!("{API_BASE_URL}/v1/projects"))
        .json(&json!({ "properties": {} }))
        .send()
        .await
        .expect("create project")
        .json()
        .await
        .expect("parse project");
    let project_id = project["project_id"].as_str().unwrap().to_string();

    let branches: serde_json::Value = client
        .get(format!("{API_BASE_URL}/v1/projects/{project_id}/branches"))
        .send()
        .await
        .expect("list branches")
        .json()
        .await
        .expect("parse branches");
    let branch_id = branches["data"][0]["identifier"].as_str().unwrap().to_string();

    let response = client
        .post(format!("{API_BASE_URL}/v1/branches/{branch_id}/modules"))
        .json(&json!({
            "command": {
                "package_id": "pycell",
                "command_id": "python_cell",
                "arguments": [{ "kind": "scalar", "name": "code", "value": "print(1)" }]
            }
        }))
        .send()
        .await
        .expect("append module");
    assert_eq!(response.status(), 201);

    let workflow: Workflow = response.json().await.expect("parse workflow");
    assert_eq!(workflow.modules.len(), 1);
    let module_id = workflow.modules[0].as_str().to_string();

    // Poll the module until it reaches a terminal state.
    let mut module: Module = client
        .get(format!("{API_BASE_URL}/v1/modules/{module_id}"))
        .send()
        .await
        .expect("get module")
        .json()
        .await
        .expect("parse module");

    for _ in 0..50 {
        if module.state.is_terminal() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        module = client
            .get(format!("{API_BASE_URL}/v1/modules/{module_id}"))
            .send()
            .await
            .expect("get module")
            .json()
            .await
            .expect("parse module");
    }

    assert_eq!(module.state, vizier_core::ModuleState::Success);
}

#[tokio::test]
#[ignore]
async fn test_health_endpoint() {
    let client = reqwest::Client::new();
    let response = client.get(format!("{API_BASE_URL}/health")).send().await.expect("health");
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.expect("parse health");
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
#[ignore]
async fn test_openapi_spec() {
    let client = reqwest::Client::new();
    let response = client
        .get(format!("{API_BASE_URL}/api-doc/openapi.json"))
        .send()
        .await
        .expect("openapi");
    assert_eq!(response.status(), 200);
    let spec: serde_json::Value = response.json().await.expect("parse spec");
    assert_eq!(spec["info"]["title"], "Vizier API");
}
