use std::sync::Arc;
use std::time::Duration;

use loadcase_core::{
    Error, ParameterError, RecordingSink, ScenarioDefinition, ScenarioOptions, ScenarioTask, Step,
    StepError, StepInput, StepReport, Value, from_fn,
};
use parking_lot::Mutex;

fn options(json: &str) -> ScenarioOptions {
    serde_json::from_str(json).unwrap_or_else(|e| panic!("expected valid options: {e}"))
}

fn login_step(seen: Arc<Mutex<Vec<(String, String)>>>) -> Step {
    Step::request(
        "login",
        from_fn(move |input: StepInput| {
            let seen = seen.clone();
            async move {
                let user = input.variables.get("username").and_then(Value::as_str);
                let pass = input.variables.get("password").and_then(Value::as_str);
                let (Some(user), Some(pass)) = (user, pass) else {
                    return Err(StepError::Assertion("credentials not bound".to_string()));
                };
                seen.lock().push((user.to_string(), pass.to_string()));
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(StepReport::default())
            }
        }),
    )
}

#[tokio::test(start_paused = true)]
async fn concurrent_runs_get_distinct_bindings() -> anyhow::Result<()> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let config = ScenarioDefinition::new(
        options(
            r#"{
                "name": "login",
                "variables": {"host": "shop.test"},
                "parameters": {
                    "username-password": [["alice", "a1"], ["bob", "b2"], ["carol", "c3"]]
                }
            }"#,
        ),
        vec![login_step(seen.clone())],
    )
    .into_config()?;
    let task = Arc::new(ScenarioTask::new(
        Arc::new(config),
        Arc::new(RecordingSink::default()),
    ));

    let first = tokio::spawn({
        let task = task.clone();
        async move { task.run().await }
    });
    let second = tokio::spawn({
        let task = task.clone();
        async move { task.run().await }
    });
    assert!(first.await?.success);
    assert!(second.await?.success);

    let mut seen = seen.lock().clone();
    seen.sort();
    assert_eq!(
        seen,
        vec![
            ("alice".to_string(), "a1".to_string()),
            ("bob".to_string(), "b2".to_string()),
        ]
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn exhausted_parameters_leave_runs_unbound() -> anyhow::Result<()> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let config = ScenarioDefinition::new(
        options(
            r#"{
                "name": "login",
                "parameters": {"username-password": [["alice", "a1"]]}
            }"#,
        ),
        vec![login_step(seen.clone())],
    )
    .into_config()?;
    let task = ScenarioTask::new(Arc::new(config), Arc::new(RecordingSink::default()));

    assert!(task.run().await.success);
    // The single row is used up, so the second run has nothing to log in with.
    assert!(!task.run().await.success);
    assert_eq!(seen.lock().len(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn unlimited_parameters_cycle() -> anyhow::Result<()> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let config = ScenarioDefinition::new(
        options(
            r#"{
                "name": "login",
                "parameters": {"username-password": [["alice", "a1"], ["bob", "b2"]]},
                "parameters_setting": {"limit": "unlimited"}
            }"#,
        ),
        vec![login_step(seen.clone())],
    )
    .into_config()?;
    let task = ScenarioTask::new(Arc::new(config), Arc::new(RecordingSink::default()));

    for _ in 0..3 {
        assert!(task.run().await.success);
    }
    let users: Vec<String> = seen.lock().iter().map(|(u, _)| u.clone()).collect();
    assert_eq!(users, vec!["alice", "bob", "alice"]);
    Ok(())
}

#[test]
fn malformed_parameters_are_configuration_errors() {
    let def = ScenarioDefinition::new(
        options(
            r#"{
                "name": "login",
                "parameters": {"username": ["alice"]},
                "parameters_setting": {"strategies": {"username": "shuffle"}}
            }"#,
        ),
        vec![login_step(Arc::new(Mutex::new(Vec::new())))],
    );

    match def.into_config() {
        Err(Error::Parameters { scenario, source }) => {
            assert_eq!(scenario, "login");
            assert!(matches!(source, ParameterError::UnknownStrategy { .. }));
        }
        other => panic!("expected parameter error, got {other:?}"),
    }
}
