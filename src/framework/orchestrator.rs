use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::audit::{AuditEvent, AuditLog};
use crate::config::SafetyConfig;
use crate::errors::FrameworkError;
use crate::models::{
    ExecutionRequest, ExecutionResult, SanitizedPayload, SecurityLevel, SecurityViolation,
    ThreatKind,
};
use crate::rollback::RollbackManager;
use crate::sandbox::{ProcessSandbox, ResourceLimits, SandboxBackend};
use crate::validators::{CommandSanitizer, InputValidator, TemplateSanitizer, ThreatDetector};

use super::state::RequestState;

/// Aggregate safety decision for a request, without execution.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SafetyReport {
    pub is_safe: bool,
    pub violations: Vec<SecurityViolation>,
    pub sanitized_content: String,
}

/// The single public entry point: validate → (if safe) snapshot →
/// sandbox-execute → log → (on failure) rollback. No component below this
/// one may unilaterally authorize execution.
pub struct SafetyFramework {
    config: Arc<SafetyConfig>,
    input_validator: InputValidator,
    command_sanitizer: CommandSanitizer,
    template_sanitizer: TemplateSanitizer,
    threat_detector: ThreatDetector,
    rollback: RollbackManager,
    sandbox: Arc<dyn SandboxBackend>,
    audit: AuditLog,
    cancel_token: CancellationToken,
}

impl SafetyFramework {
    pub async fn new(config: SafetyConfig) -> Result<Self, FrameworkError> {
        let config = Arc::new(config);
        tokio::fs::create_dir_all(&config.settings.workspace_dir).await?;

        let audit = AuditLog::initialize(&config.settings.audit_dir).await?;
        let rollback = RollbackManager::new(&config.settings.snapshot_dir)?;
        let sandbox: Arc<dyn SandboxBackend> =
            Arc::new(ProcessSandbox::new(&config.settings.workspace_dir));

        Ok(Self {
            input_validator: InputValidator::new(),
            command_sanitizer: CommandSanitizer::new(config.clone()),
            template_sanitizer: TemplateSanitizer::new(config.clone()),
            threat_detector: ThreatDetector::new(),
            config,
            rollback,
            sandbox,
            audit,
            cancel_token: CancellationToken::new(),
        })
    }

    /// Swap in a different sandbox backend (e.g. a namespace-based one).
    pub fn with_sandbox(mut self, sandbox: Arc<dyn SandboxBackend>) -> Self {
        self.sandbox = sandbox;
        self
    }

    /// Replace the framework's cancel token with an external one so the
    /// caller's `.cancel()` reaches the sandbox wait loop.
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Run all four validators and fold their findings into one decision.
    /// Exact duplicates (same kind, severity, and matched content) collapse;
    /// distinct findings are never dropped.
    pub fn validate(
        &self,
        template: &str,
        variables: &HashMap<String, String>,
        level: SecurityLevel,
    ) -> SafetyReport {
        let mut violations = self.input_validator.validate(template, variables, level);

        let SanitizedPayload {
            content,
            violations: template_violations,
        } = self.template_sanitizer.sanitize(template, variables);
        violations.extend(template_violations);

        // Command and threat layers sweep both the raw template and the
        // substituted payload: the raw pass sees tokens the sanitizer may
        // strip, the payload pass sees what variables smuggled in.
        violations.extend(self.command_sanitizer.validate_commands(template));
        violations.extend(self.command_sanitizer.validate_commands(&content));
        violations.extend(self.threat_detector.detect(template));
        violations.extend(self.threat_detector.detect(&content));

        let violations = dedup_violations(violations);
        let threshold = rejection_threshold(level);
        let is_safe = !violations.iter().any(|v| v.severity >= threshold);

        SafetyReport {
            is_safe,
            violations,
            sanitized_content: content,
        }
    }

    /// [`submit`](Self::submit) for a pre-built request.
    pub async fn submit_request(
        &self,
        request: &ExecutionRequest,
    ) -> Result<ExecutionResult, FrameworkError> {
        self.submit(
            &request.template,
            &request.variables,
            request.requested_level,
        )
        .await
    }

    /// Full pipeline for one request. Validation violations are data in the
    /// result; an `Err` here is a framework fault (config, audit, rollback).
    pub async fn submit(
        &self,
        template: &str,
        variables: &HashMap<String, String>,
        level: SecurityLevel,
    ) -> Result<ExecutionResult, FrameworkError> {
        let execution_id = uuid::Uuid::new_v4().to_string();
        info!(execution_id = %execution_id, level = %level, "Request received");
        self.audit
            .log_event(AuditEvent::RequestReceived {
                execution_id: execution_id.clone(),
                level: level.to_string(),
            })
            .await?;

        debug!(execution_id = %execution_id, state = %RequestState::Validating, "Validating request");
        let report = self.validate(template, variables, level);
        for violation in &report.violations {
            self.audit.log_violation(&execution_id, violation)?;
        }

        if !report.is_safe {
            warn!(
                execution_id = %execution_id,
                violations = report.violations.len(),
                // Defanged preview only; the raw template never hits the log.
                template = %self.command_sanitizer.sanitize_command(template),
                "Request rejected; execution will not occur"
            );
            let result = ExecutionResult::rejected(&execution_id, report.violations);
            self.finish(&execution_id, RequestState::Rejected, &result)
                .await?;
            return Ok(result);
        }
        debug!(execution_id = %execution_id, state = %RequestState::Sanitized, "Request sanitized");

        // Snapshotting. The directory guard is held until commit/restore so
        // a restore can never race another execution's snapshot of the same
        // workspace.
        debug!(execution_id = %execution_id, state = %RequestState::Snapshotting, "Creating rollback point");
        let workspace = self.config.settings.workspace_dir.clone();
        let _dir_guard = self.rollback.lock_dir(&workspace).await;
        let point = self.rollback.create_rollback_point(&workspace)?;
        self.audit
            .log_event(AuditEvent::RollbackPointCreated {
                execution_id: execution_id.clone(),
                rollback_id: point.id.clone(),
                target_dir: workspace.display().to_string(),
            })
            .await?;

        debug!(execution_id = %execution_id, state = %RequestState::Executing, "Executing payload");
        self.audit
            .log_event(AuditEvent::ExecutionStarted {
                execution_id: execution_id.clone(),
            })
            .await?;
        let limits = ResourceLimits::for_level(level, &self.config.settings);
        let mut result = self
            .sandbox
            .execute(
                &report.sanitized_content,
                &execution_id,
                &limits,
                self.cancel_token.child_token(),
            )
            .await;
        result.violations = report.violations;

        let terminal = if result.success {
            self.rollback.commit(&point.id)?;
            RequestState::Committed
        } else {
            let restored = self.rollback.restore(&point.id)?;
            self.audit
                .log_event(AuditEvent::RolledBack {
                    execution_id: execution_id.clone(),
                    rollback_id: point.id.clone(),
                    restored,
                })
                .await?;
            RequestState::RolledBack
        };

        self.finish(&execution_id, terminal, &result).await?;
        Ok(result)
    }

    /// Write the single summary audit record every terminal state gets.
    async fn finish(
        &self,
        execution_id: &str,
        terminal: RequestState,
        result: &ExecutionResult,
    ) -> Result<(), FrameworkError> {
        self.audit
            .log_event(AuditEvent::RequestCompleted {
                execution_id: execution_id.to_string(),
                terminal_state: terminal.to_string(),
                outcome: result.outcome.as_str().to_string(),
                success: result.success,
                violation_count: result.violations.len(),
            })
            .await?;
        info!(
            execution_id = %execution_id,
            terminal_state = %terminal,
            state = %RequestState::Logged,
            success = result.success,
            "Request finished"
        );
        Ok(())
    }
}

/// Severity at or above which a request is rejected, by configured
/// strictness. Monotonic: everything a lower strictness rejects, a higher
/// one rejects too.
fn rejection_threshold(level: SecurityLevel) -> SecurityLevel {
    match level {
        SecurityLevel::Low | SecurityLevel::Medium => SecurityLevel::Critical,
        SecurityLevel::High => SecurityLevel::High,
        SecurityLevel::Critical => SecurityLevel::Medium,
    }
}

fn dedup_violations(violations: Vec<SecurityViolation>) -> Vec<SecurityViolation> {
    let mut seen: HashSet<(ThreatKind, SecurityLevel, String)> = HashSet::new();
    violations
        .into_iter()
        .filter(|v| seen.insert((v.kind, v.severity, v.blocked_content.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::models::ExecutionOutcome;

    fn test_config(root: &Path) -> SafetyConfig {
        let mut config = SafetyConfig::builtin();
        config.settings.workspace_dir = root.join("workspace");
        config.settings.snapshot_dir = root.join("snapshots");
        config.settings.audit_dir = root.join("audit");
        config.settings.timeout_secs = 5;
        config
    }

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    /// Sandbox double that records invocations and returns a fixed outcome.
    struct StubSandbox {
        calls: Arc<AtomicUsize>,
        outcome: ExecutionOutcome,
    }

    #[async_trait]
    impl SandboxBackend for StubSandbox {
        async fn execute(
            &self,
            _payload: &str,
            execution_id: &str,
            _limits: &ResourceLimits,
            _cancel: CancellationToken,
        ) -> ExecutionResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            ExecutionResult {
                execution_id: execution_id.to_string(),
                success: self.outcome == ExecutionOutcome::Completed,
                outcome: self.outcome,
                exit_status: Some(if self.outcome == ExecutionOutcome::Completed {
                    0
                } else {
                    1
                }),
                stdout: String::new(),
                stderr: String::new(),
                violations: Vec::new(),
                duration_ms: 1,
            }
        }
    }

    async fn framework_with_stub(
        root: &Path,
        outcome: ExecutionOutcome,
    ) -> (SafetyFramework, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let framework = SafetyFramework::new(test_config(root))
            .await
            .unwrap()
            .with_sandbox(Arc::new(StubSandbox {
                calls: calls.clone(),
                outcome,
            }));
        (framework, calls)
    }

    #[tokio::test]
    async fn test_blacklisted_template_rejected_and_never_executed() {
        let root = tempfile::tempdir().unwrap();
        let (framework, calls) =
            framework_with_stub(root.path(), ExecutionOutcome::Completed).await;

        for level in [
            SecurityLevel::Low,
            SecurityLevel::Medium,
            SecurityLevel::High,
            SecurityLevel::Critical,
        ] {
            let result = framework
                .submit("; rm -rf /", &HashMap::new(), level)
                .await
                .unwrap();
            assert!(!result.success, "level {level}");
            assert_eq!(result.outcome, ExecutionOutcome::Rejected);

            let critical_injections = result
                .violations
                .iter()
                .filter(|v| {
                    v.severity == SecurityLevel::Critical
                        && v.kind == ThreatKind::CommandInjection
                })
                .count();
            assert_eq!(critical_injections, 1, "level {level}");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_safe_template_executes_and_commits() {
        let root = tempfile::tempdir().unwrap();
        let (framework, calls) =
            framework_with_stub(root.path(), ExecutionOutcome::Completed).await;

        let result = framework
            .submit(
                "echo [USER]",
                &vars(&[("USER", "Christian")]),
                SecurityLevel::Low,
            )
            .await
            .unwrap();

        assert!(result.success);
        assert!(result.violations.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Committed executions leave no archived snapshot behind.
        let snapshots: Vec<_> = std::fs::read_dir(root.path().join("snapshots"))
            .unwrap()
            .collect();
        assert!(snapshots.is_empty());
    }

    #[tokio::test]
    async fn test_failed_execution_rolls_back_workspace() {
        let root = tempfile::tempdir().unwrap();
        let (framework, _calls) =
            framework_with_stub(root.path(), ExecutionOutcome::Failed).await;

        let workspace = root.path().join("workspace");
        std::fs::write(workspace.join("state.txt"), "before").unwrap();

        let result = framework
            .submit("echo hello", &HashMap::new(), SecurityLevel::Low)
            .await
            .unwrap();

        assert!(!result.success);
        let content = std::fs::read_to_string(workspace.join("state.txt")).unwrap();
        assert_eq!(content, "before");
    }

    #[tokio::test]
    async fn test_high_strictness_rejects_high_violations() {
        let root = tempfile::tempdir().unwrap();
        let (framework, calls) = framework_with_stub(root.path(), ExecutionOutcome::Completed).await;

        // Traversal in a variable is High: accepted at Low, rejected at High.
        let variables = vars(&[("FILE", "../../etc/passwd")]);

        let at_low = framework
            .submit("cat [FILE]", &variables, SecurityLevel::Low)
            .await
            .unwrap();
        assert_ne!(at_low.outcome, ExecutionOutcome::Rejected);
        assert!(at_low
            .violations
            .iter()
            .any(|v| v.kind == ThreatKind::PathTraversal && v.severity == SecurityLevel::High));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let at_high = framework
            .submit("cat [FILE]", &variables, SecurityLevel::High)
            .await
            .unwrap();
        assert_eq!(at_high.outcome, ExecutionOutcome::Rejected);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_traversal_stripped_from_sanitized_payload() {
        let root = tempfile::tempdir().unwrap();
        let (framework, _calls) =
            framework_with_stub(root.path(), ExecutionOutcome::Completed).await;

        let report = framework.validate(
            "cat [FILE]",
            &vars(&[("FILE", "../../etc/passwd")]),
            SecurityLevel::Low,
        );
        assert!(!report.sanitized_content.contains("../"));
        assert!(report
            .violations
            .iter()
            .any(|v| v.kind == ThreatKind::PathTraversal && v.severity == SecurityLevel::High));
    }

    #[tokio::test]
    async fn test_violations_monotonic_across_levels() {
        let root = tempfile::tempdir().unwrap();
        let (framework, _calls) =
            framework_with_stub(root.path(), ExecutionOutcome::Completed).await;

        let template = format!("echo {}", "x".repeat(3_000));
        let variables = vars(&[("A", "../../secret")]);

        let low = framework.validate(&template, &variables, SecurityLevel::Low);
        let critical = framework.validate(&template, &variables, SecurityLevel::Critical);

        for v in &low.violations {
            assert!(
                critical
                    .violations
                    .iter()
                    .any(|c| c.kind == v.kind
                        && c.severity == v.severity
                        && c.blocked_content == v.blocked_content),
                "violation reported at Low missing at Critical: {v:?}"
            );
        }
        assert!(critical.violations.len() >= low.violations.len());
    }

    #[tokio::test]
    async fn test_summary_event_written_per_request() {
        let root = tempfile::tempdir().unwrap();
        let (framework, _calls) =
            framework_with_stub(root.path(), ExecutionOutcome::Completed).await;

        framework
            .submit("; rm -rf /", &HashMap::new(), SecurityLevel::Low)
            .await
            .unwrap();
        framework
            .submit("echo ok", &HashMap::new(), SecurityLevel::Low)
            .await
            .unwrap();

        let events =
            std::fs::read_to_string(root.path().join("audit").join("events.jsonl")).unwrap();
        let summaries = events
            .lines()
            .filter(|l| l.contains("request_completed"))
            .count();
        assert_eq!(summaries, 2);
    }

    #[tokio::test]
    async fn test_rejected_violations_recorded_in_store() {
        let root = tempfile::tempdir().unwrap();
        let (framework, _calls) =
            framework_with_stub(root.path(), ExecutionOutcome::Completed).await;

        framework
            .submit("; rm -rf /", &HashMap::new(), SecurityLevel::Low)
            .await
            .unwrap();

        let stored = framework
            .audit()
            .store()
            .query(&crate::audit::ViolationFilter {
                min_severity: Some(SecurityLevel::Critical),
                kind: Some(ThreatKind::CommandInjection),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(stored.len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_findings_collapse() {
        let root = tempfile::tempdir().unwrap();
        let (framework, _calls) =
            framework_with_stub(root.path(), ExecutionOutcome::Completed).await;

        // The same blacklisted segment appears in raw and sanitized scans;
        // the aggregate must not double-count it.
        let report = framework.validate("sudo id", &HashMap::new(), SecurityLevel::Low);
        let critical = report
            .violations
            .iter()
            .filter(|v| {
                v.kind == ThreatKind::CommandInjection && v.severity == SecurityLevel::Critical
            })
            .count();
        assert_eq!(critical, 1);
    }
}
