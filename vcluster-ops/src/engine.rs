// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The plan engine: drives an ordered, immutable list of operations.
//!
//! The engine invokes `prepare -> (execute | skip) -> finalize` exactly
//! once per operation, in plan order, and stops at the first failing
//! step, returning its error verbatim. There is no rollback and no
//! retry here; commands order their operations so that early failures
//! leave no destructive half-state.

use crate::certs::HttpsCerts;
use crate::error::OpsError;
use crate::exec_context::OpEngineExecContext;
use crate::op::ClusterOp;
use slog::{info, Logger};

pub struct ClusterOpEngine {
    instructions: Vec<Box<dyn ClusterOp>>,
    certs: HttpsCerts,
    exec_context: Option<OpEngineExecContext>,
}

impl ClusterOpEngine {
    pub fn new(instructions: Vec<Box<dyn ClusterOp>>, certs: HttpsCerts) -> Self {
        ClusterOpEngine { instructions, certs, exec_context: None }
    }

    /// The execution context of the last `run`, for commands that read
    /// data published by their pre-check plans.
    pub fn exec_context(&self) -> Option<&OpEngineExecContext> {
        self.exec_context.as_ref()
    }

    pub async fn run(&mut self, log: &Logger) -> Result<(), OpsError> {
        let mut ctx = OpEngineExecContext::new(log);
        let result = self.run_with_context(&mut ctx, log).await;
        // Keep the context even on failure so callers can inspect what
        // the completed steps published.
        self.exec_context = Some(ctx);
        result
    }

    async fn run_with_context(
        &mut self,
        ctx: &mut OpEngineExecContext,
        log: &Logger,
    ) -> Result<(), OpsError> {
        let find_certs_in_options = self.certs.is_complete();

        for op in &mut self.instructions {
            op.log_prepare();
            op.prepare(ctx).await?;

            if !op.skip_execute() {
                op.load_certs_if_needed(&self.certs, find_certs_in_options)?;
                op.log_execute();
                op.execute(ctx).await?;
            }

            op.log_finalize();
            op.finalize(ctx).await?;
            info!(log, "operation completed"; "op" => op.name());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::OpBase;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    type CallLog = Arc<Mutex<Vec<String>>>;

    struct ScriptedOp {
        base: OpBase,
        calls: CallLog,
        fail_in_execute: bool,
        skip: bool,
    }

    impl ScriptedOp {
        fn new(name: &'static str, calls: &CallLog, fail_in_execute: bool, skip: bool) -> Self {
            let log = Logger::root(slog::Discard, slog::o!());
            ScriptedOp {
                base: OpBase::new(name, &log, vec![]),
                calls: Arc::clone(calls),
                fail_in_execute,
                skip,
            }
        }

        fn record(&self, phase: &str) {
            self.calls.lock().unwrap().push(format!("{}:{phase}", self.name()));
        }
    }

    #[async_trait]
    impl ClusterOp for ScriptedOp {
        fn base(&self) -> &OpBase {
            &self.base
        }

        fn base_mut(&mut self) -> &mut OpBase {
            &mut self.base
        }

        async fn prepare(&mut self, _ctx: &mut OpEngineExecContext) -> Result<(), OpsError> {
            self.record("prepare");
            self.base.skip_execute = self.skip;
            Ok(())
        }

        async fn execute(&mut self, ctx: &mut OpEngineExecContext) -> Result<(), OpsError> {
            self.record("execute");
            if self.fail_in_execute {
                return Err(OpsError::internal(self.name(), "scripted failure"));
            }
            self.process_result(ctx)
        }

        fn process_result(&mut self, _ctx: &mut OpEngineExecContext) -> Result<(), OpsError> {
            Ok(())
        }

        async fn finalize(&mut self, _ctx: &mut OpEngineExecContext) -> Result<(), OpsError> {
            self.record("finalize");
            Ok(())
        }
    }

    fn test_logger() -> Logger {
        Logger::root(slog::Discard, slog::o!())
    }

    #[tokio::test]
    async fn lifecycle_runs_in_order() {
        let calls: CallLog = Arc::default();
        let ops: Vec<Box<dyn ClusterOp>> = vec![
            Box::new(ScriptedOp::new("op1", &calls, false, false)),
            Box::new(ScriptedOp::new("op2", &calls, false, false)),
        ];
        let mut engine = ClusterOpEngine::new(ops, HttpsCerts::default());
        engine.run(&test_logger()).await.unwrap();
        assert_eq!(
            *calls.lock().unwrap(),
            vec![
                "op1:prepare",
                "op1:execute",
                "op1:finalize",
                "op2:prepare",
                "op2:execute",
                "op2:finalize",
            ]
        );
    }

    #[tokio::test]
    async fn failure_stops_remaining_operations() {
        let calls: CallLog = Arc::default();
        let ops: Vec<Box<dyn ClusterOp>> = vec![
            Box::new(ScriptedOp::new("op1", &calls, true, false)),
            Box::new(ScriptedOp::new("op2", &calls, false, false)),
        ];
        let mut engine = ClusterOpEngine::new(ops, HttpsCerts::default());
        let err = engine.run(&test_logger()).await.unwrap_err();
        assert!(err.to_string().contains("scripted failure"));
        // op1 never reaches finalize, op2 never starts.
        assert_eq!(*calls.lock().unwrap(), vec!["op1:prepare", "op1:execute"]);
    }

    #[tokio::test]
    async fn skip_execute_bypasses_execute_but_not_finalize() {
        let calls: CallLog = Arc::default();
        let ops: Vec<Box<dyn ClusterOp>> =
            vec![Box::new(ScriptedOp::new("op1", &calls, false, true))];
        let mut engine = ClusterOpEngine::new(ops, HttpsCerts::default());
        engine.run(&test_logger()).await.unwrap();
        assert_eq!(*calls.lock().unwrap(), vec!["op1:prepare", "op1:finalize"]);
    }
}
