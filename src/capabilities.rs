//! Built-in demo capabilities for the CLI.
//!
//! Enough to exercise real plans end to end: run a command, touch the file
//! system, wait. Per-attempt timeouts are applied by the engine, not here.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio::fs;
use tokio::process::Command;

use taskweave_core::exec::ExecutionContext;
use taskweave_core::{Capability, CapabilityFailure, CapabilityRegistry};

pub fn builtin_registry() -> CapabilityRegistry {
    let mut registry = CapabilityRegistry::new();
    registry.register(Arc::new(ShellCapability));
    registry.register(Arc::new(ReadFileCapability));
    registry.register(Arc::new(WriteFileCapability));
    registry.register(Arc::new(SleepCapability));
    registry
}

fn required_str<'a>(
    args: &'a Map<String, Value>,
    key: &str,
) -> Result<&'a str, CapabilityFailure> {
    args.get(key).and_then(Value::as_str).ok_or_else(|| {
        CapabilityFailure::permanent(format!("missing '{key}' argument")).with_code("INVALID_ARGS")
    })
}

/// Run a command and capture its output.
struct ShellCapability;

#[async_trait]
impl Capability for ShellCapability {
    fn name(&self) -> &str {
        "shell"
    }

    async fn invoke(
        &self,
        _ctx: &ExecutionContext,
        args: &Map<String, Value>,
    ) -> Result<Value, CapabilityFailure> {
        let command = required_str(args, "command")?;
        let mut parts = command.split_whitespace();
        let program = parts.next().ok_or_else(|| {
            CapabilityFailure::permanent("empty command").with_code("INVALID_ARGS")
        })?;

        let output = Command::new(program)
            .args(parts)
            .output()
            .await
            .map_err(|e| {
                CapabilityFailure::transient(format!("failed to spawn '{program}': {e}"))
                    .with_code("EXEC_ERROR")
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if output.status.success() {
            Ok(json!({ "stdout": stdout, "exit_code": 0 }))
        } else {
            Err(CapabilityFailure::permanent(format!(
                "exit code {:?}\nstdout: {stdout}\nstderr: {stderr}",
                output.status.code()
            ))
            .with_code("NONZERO_EXIT"))
        }
    }
}

struct ReadFileCapability;

#[async_trait]
impl Capability for ReadFileCapability {
    fn name(&self) -> &str {
        "read_file"
    }

    async fn invoke(
        &self,
        _ctx: &ExecutionContext,
        args: &Map<String, Value>,
    ) -> Result<Value, CapabilityFailure> {
        let path = required_str(args, "path")?;
        let content = fs::read_to_string(path).await.map_err(|e| {
            CapabilityFailure::permanent(format!("error reading '{path}': {e}"))
                .with_code("READ_ERROR")
        })?;
        Ok(json!({ "path": path, "content": content }))
    }
}

struct WriteFileCapability;

#[async_trait]
impl Capability for WriteFileCapability {
    fn name(&self) -> &str {
        "write_file"
    }

    async fn invoke(
        &self,
        _ctx: &ExecutionContext,
        args: &Map<String, Value>,
    ) -> Result<Value, CapabilityFailure> {
        let path = required_str(args, "path")?;
        let content = required_str(args, "content")?;
        fs::write(path, content).await.map_err(|e| {
            CapabilityFailure::permanent(format!("error writing '{path}': {e}"))
                .with_code("WRITE_ERROR")
        })?;
        Ok(json!({ "path": path, "bytes": content.len() }))
    }
}

/// Wait for `ms` milliseconds. Useful for demo plans and for watching
/// parallelism and cancellation behave.
struct SleepCapability;

#[async_trait]
impl Capability for SleepCapability {
    fn name(&self) -> &str {
        "sleep"
    }

    async fn invoke(
        &self,
        _ctx: &ExecutionContext,
        args: &Map<String, Value>,
    ) -> Result<Value, CapabilityFailure> {
        let ms = args.get("ms").and_then(Value::as_u64).ok_or_else(|| {
            CapabilityFailure::permanent("missing 'ms' argument").with_code("INVALID_ARGS")
        })?;
        tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
        Ok(json!({ "slept_ms": ms }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskweave_core::GoalId;

    #[tokio::test]
    async fn test_registry_has_builtins() {
        let registry = builtin_registry();
        assert_eq!(
            registry.names(),
            vec!["read_file", "shell", "sleep", "write_file"]
        );
    }

    #[tokio::test]
    async fn test_write_then_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.txt");
        let ctx = ExecutionContext::new(GoalId::new());

        let mut args = Map::new();
        args.insert("path".into(), json!(path.to_str().unwrap()));
        args.insert("content".into(), json!("hello"));
        WriteFileCapability.invoke(&ctx, &args).await.unwrap();

        let mut args = Map::new();
        args.insert("path".into(), json!(path.to_str().unwrap()));
        let out = ReadFileCapability.invoke(&ctx, &args).await.unwrap();
        assert_eq!(out["content"], "hello");
    }

    #[tokio::test]
    async fn test_missing_argument_is_permanent() {
        let ctx = ExecutionContext::new(GoalId::new());
        let err = ShellCapability.invoke(&ctx, &Map::new()).await.unwrap_err();
        assert!(!err.retryable);
        assert_eq!(err.code.as_deref(), Some("INVALID_ARGS"));
    }
}
