use std::sync::Mutex;

use async_trait::async_trait;
use serde::Deserialize;

use homeroomd::ai::{generate_json, GenError, GenOptions, RetryPolicy, TextGenerator};

/// Generator that replays a script of canned responses and records the
/// temperature of each call.
struct ScriptedGenerator {
    outputs: Mutex<Vec<Result<String, GenError>>>,
    temperatures: Mutex<Vec<f32>>,
}

impl ScriptedGenerator {
    fn new(outputs: Vec<Result<String, GenError>>) -> Self {
        Self {
            outputs: Mutex::new(outputs),
            temperatures: Mutex::new(Vec::new()),
        }
    }

    fn recorded_temperatures(&self) -> Vec<f32> {
        self.temperatures.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(
        &self,
        _system: &str,
        _user: &str,
        opts: &GenOptions,
    ) -> Result<String, GenError> {
        self.temperatures.lock().unwrap().push(opts.temperature);
        let mut outputs = self.outputs.lock().unwrap();
        assert!(!outputs.is_empty(), "generator called more than scripted");
        outputs.remove(0)
    }
}

#[derive(Debug, Deserialize, PartialEq)]
struct Payload {
    value: i64,
}

#[tokio::test]
async fn recovers_from_bad_json_at_a_cooler_temperature() {
    let generator = ScriptedGenerator::new(vec![
        Ok("sure, here's an idea!".to_string()),
        Ok("```json\n{\"value\": 7}\n```".to_string()),
    ]);

    let parsed: Payload = generate_json(
        &generator,
        &RetryPolicy::default(),
        "system",
        "user",
        256,
    )
    .await
    .expect("second attempt parses");

    assert_eq!(parsed, Payload { value: 7 });
    let temps = generator.recorded_temperatures();
    assert_eq!(temps.len(), 2);
    assert!(temps[1] < temps[0], "retry should run cooler");
}

#[tokio::test]
async fn reports_bad_json_after_exhausting_attempts() {
    let generator = ScriptedGenerator::new(vec![
        Ok("nope".to_string()),
        Ok("still nope".to_string()),
        Ok("{\"value\": \"not a number\"}".to_string()),
    ]);

    let result: Result<Payload, GenError> = generate_json(
        &generator,
        &RetryPolicy::default(),
        "system",
        "user",
        256,
    )
    .await;

    match result {
        Err(GenError::BadJson { attempts, .. }) => assert_eq!(attempts, 3),
        other => panic!("expected BadJson, got {:?}", other),
    }
    assert_eq!(generator.recorded_temperatures().len(), 3);
}

#[tokio::test]
async fn transport_errors_are_not_retried() {
    let generator = ScriptedGenerator::new(vec![Err(GenError::Transport(
        "connection refused".to_string(),
    ))]);

    let result: Result<Payload, GenError> = generate_json(
        &generator,
        &RetryPolicy::default(),
        "system",
        "user",
        256,
    )
    .await;

    assert!(matches!(result, Err(GenError::Transport(_))));
    assert_eq!(generator.recorded_temperatures().len(), 1);
}

#[tokio::test]
async fn empty_completion_counts_as_a_failed_attempt() {
    let generator = ScriptedGenerator::new(vec![
        Ok("   ".to_string()),
        Ok("{\"value\": 3}".to_string()),
    ]);

    let parsed: Payload = generate_json(
        &generator,
        &RetryPolicy::default(),
        "system",
        "user",
        256,
    )
    .await
    .expect("retry after blank output");
    assert_eq!(parsed.value, 3);
}
