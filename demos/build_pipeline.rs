//! Minimal end-to-end example: two tasks where one depends on the other's
//! process output, run through to completion and printed.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use task_graph_solver::{
    ProcessContext, Result, SolveRequest, Solver, SolverConfig, Task, TaskKey, TaskOutcome, TaskState,
};

#[derive(Debug)]
struct Compile {
    name: String,
}

#[async_trait]
impl Task for Compile {
    fn kind(&self) -> &str {
        "compile"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn force(&self) -> bool {
        false
    }

    fn input_version(&self) -> String {
        "v-000000000001".to_string()
    }

    fn status_concurrency_limit(&self) -> usize {
        usize::MAX
    }

    fn process_concurrency_limit(&self) -> usize {
        usize::MAX
    }

    fn status_dependencies(&self) -> Vec<Arc<dyn Task>> {
        vec![]
    }

    fn process_dependencies(&self, _status: &TaskOutcome) -> Vec<Arc<dyn Task>> {
        vec![]
    }

    async fn get_status(&self, _dependency_results: task_graph_solver::GraphResults) -> Result<TaskOutcome> {
        Ok(TaskOutcome::new(TaskState::NotReady))
    }

    async fn process(&self, _ctx: ProcessContext) -> Result<TaskOutcome> {
        println!("compiling {}...", self.name);
        Ok(TaskOutcome::new(TaskState::Ready).with_outputs(json!({"artifact": format!("{}.o", self.name)})))
    }
}

#[derive(Debug)]
struct Link {
    name: String,
    object: Arc<dyn Task>,
}

#[async_trait]
impl Task for Link {
    fn kind(&self) -> &str {
        "link"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn force(&self) -> bool {
        false
    }

    fn input_version(&self) -> String {
        "v-000000000002".to_string()
    }

    fn status_concurrency_limit(&self) -> usize {
        usize::MAX
    }

    fn process_concurrency_limit(&self) -> usize {
        usize::MAX
    }

    fn status_dependencies(&self) -> Vec<Arc<dyn Task>> {
        vec![]
    }

    fn process_dependencies(&self, _status: &TaskOutcome) -> Vec<Arc<dyn Task>> {
        vec![self.object.clone()]
    }

    async fn get_status(&self, _dependency_results: task_graph_solver::GraphResults) -> Result<TaskOutcome> {
        Ok(TaskOutcome::new(TaskState::NotReady))
    }

    async fn process(&self, ctx: ProcessContext) -> Result<TaskOutcome> {
        let object_key = TaskKey::new("compile", &self.name);
        let object_result = ctx.dependency_results.get_result(&object_key).expect("object file must be compiled first");
        let artifact: &Value = &object_result.outputs["artifact"];
        println!("linking {artifact} into {}", self.name);
        Ok(TaskOutcome::new(TaskState::Ready).with_outputs(json!({"binary": self.name})))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let solver = Solver::new(SolverConfig::default())?;

    let compile: Arc<dyn Task> = Arc::new(Compile { name: "main".to_string() });
    let link: Arc<dyn Task> = Arc::new(Link { name: "main".to_string(), object: compile.clone() });

    let outcome = solver
        .solve(SolveRequest::new(vec![link.clone()]))
        .await
        .map_err(|e| anyhow::anyhow!(e.message))?;

    let result = outcome.results.get_result(&link.key()).expect("link must have a result");
    println!("done: {}", result.outputs["binary"]);

    Ok(())
}
