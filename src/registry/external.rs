//! External validator - runs a validator executable as a subprocess

use crate::core::config::ExternalValidatorConfig;
use crate::core::context::ConnectionString;
use crate::registry::{
    CallArgs, Capability, CapabilityError, CapabilityOutcome, ParamKind, ParamSpec,
    ParameterContract, StepRegistry,
};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Capability backed by an external validator executable
///
/// The call is written to the process's stdin as a JSON object:
///
/// ```json
/// { "step_id": "rows", "params": { "table": "orders" },
///   "connections": { "source": "oracle://...", "target": "snowflake://..." } }
/// ```
///
/// and the process must print a single outcome object on stdout, e.g.
/// `{"status":"FAIL","severity":"error","message":"...","details":{...}}`.
#[derive(Debug, Clone)]
pub struct ExternalCapability {
    config: ExternalValidatorConfig,
}

impl ExternalCapability {
    pub fn new(config: ExternalValidatorConfig) -> Self {
        Self { config }
    }

    fn request_payload(args: &CallArgs) -> Value {
        let connections: Map<String, Value> = args
            .connections
            .iter()
            .map(|(name, handle)| {
                let dsn = handle
                    .downcast_ref::<ConnectionString>()
                    .map(|c| Value::String(c.0.clone()))
                    .unwrap_or(Value::Null);
                (name.clone(), dsn)
            })
            .collect();

        json!({
            "step_id": args.step_id,
            "params": args.params,
            "connections": connections,
        })
    }

    async fn run(&self, payload: Vec<u8>) -> Result<std::process::Output, CapabilityError> {
        let mut child = Command::new(&self.config.command)
            .args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CapabilityError::Spawn(format!("{}: {}", self.config.command, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&payload)
                .await
                .map_err(|e| CapabilityError::Failed(format!("failed to write request: {}", e)))?;
        }

        child
            .wait_with_output()
            .await
            .map_err(|e| CapabilityError::Failed(format!("validator process failed: {}", e)))
    }
}

#[async_trait]
impl Capability for ExternalCapability {
    fn contract(&self) -> ParameterContract {
        ParameterContract::with_params(
            self.config
                .required_params
                .iter()
                .map(|name| ParamSpec::required(name.clone(), ParamKind::Any))
                .collect(),
        )
    }

    async fn execute(&self, args: CallArgs) -> Result<CapabilityOutcome, CapabilityError> {
        debug!(
            "Spawning validator '{}' for step {}",
            self.config.command, args.step_id
        );

        let payload = serde_json::to_vec(&Self::request_payload(&args))
            .map_err(|e| CapabilityError::Failed(format!("failed to encode request: {}", e)))?;

        let output = match self.config.timeout_secs {
            Some(secs) => timeout(Duration::from_secs(secs), self.run(payload))
                .await
                .map_err(|_| CapabilityError::Timeout(Duration::from_secs(secs)))??,
            None => self.run(payload).await?,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let exit_code = output.status.code().unwrap_or(-1);
            warn!(
                "validator {} exited with code {}: {}",
                self.config.command,
                exit_code,
                stderr.trim()
            );
            return Err(CapabilityError::Failed(format!(
                "validator exited with code {}: {}",
                exit_code,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8(output.stdout)
            .map_err(|e| CapabilityError::InvalidOutput(format!("output is not UTF-8: {}", e)))?;

        serde_json::from_str(stdout.trim())
            .map_err(|e| CapabilityError::InvalidOutput(e.to_string()))
    }
}

impl StepRegistry {
    /// Register every configured external validator under its name
    pub fn with_external_validators(
        mut self,
        validators: &BTreeMap<String, ExternalValidatorConfig>,
    ) -> Self {
        for (name, config) in validators {
            self.register_arc(name.clone(), Arc::new(ExternalCapability::new(config.clone())));
        }
        self
    }
}
