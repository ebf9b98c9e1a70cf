use std::sync::Arc;

use async_trait::async_trait;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;
use task_graph_solver::{
    DependencyGraph, ProcessContext, Result, SolveRequest, Solver, SolverConfig, Task, TaskOutcome, TaskState,
};
use tokio::runtime::Runtime;

fn linear_dependency_graph(n: usize) -> DependencyGraph<()> {
    let mut graph = DependencyGraph::new();
    for i in 0..n {
        graph.add_node(format!("node_{i}"), ());
    }
    for i in 1..n {
        graph.add_dependency(&format!("node_{i}"), &format!("node_{}", i - 1)).unwrap();
    }
    graph
}

fn fan_out_dependency_graph(n: usize) -> DependencyGraph<()> {
    let mut graph = DependencyGraph::new();
    graph.add_node("root", ());
    for i in 0..n {
        graph.add_node(format!("leaf_{i}"), ());
        graph.add_dependency(&format!("leaf_{i}"), "root").unwrap();
    }
    graph
}

fn benchmark_graph_construction(c: &mut Criterion) {
    c.bench_function("build_linear_graph_100", |b| b.iter(|| linear_dependency_graph(black_box(100))));
    c.bench_function("build_fan_out_graph_100", |b| b.iter(|| fan_out_dependency_graph(black_box(100))));
}

fn benchmark_overall_order(c: &mut Criterion) {
    let linear = linear_dependency_graph(100);
    let fan_out = fan_out_dependency_graph(100);

    c.bench_function("overall_order_linear_100", |b| b.iter(|| linear.overall_order(false).unwrap()));
    c.bench_function("overall_order_fan_out_100", |b| b.iter(|| fan_out.overall_order(false).unwrap()));
    c.bench_function("overall_order_leaves_only_fan_out_100", |b| {
        b.iter(|| fan_out.overall_order(true).unwrap())
    });
}

#[derive(Debug)]
struct NoopTask {
    name: String,
    dependency: Option<Arc<dyn Task>>,
}

#[async_trait]
impl Task for NoopTask {
    fn kind(&self) -> &str {
        "bench"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn force(&self) -> bool {
        false
    }

    fn input_version(&self) -> String {
        "v-000000000000".to_string()
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
        self.dependency.iter().cloned().collect()
    }

    async fn get_status(&self, _dependency_results: task_graph_solver::GraphResults) -> Result<TaskOutcome> {
        Ok(TaskOutcome::new(TaskState::NotReady))
    }

    async fn process(&self, _ctx: ProcessContext) -> Result<TaskOutcome> {
        Ok(TaskOutcome::new(TaskState::Ready).with_outputs(json!({"done": true})))
    }
}

fn benchmark_solve_chain(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    c.bench_function("solve_chain_of_20", |b| {
        b.iter(|| {
            rt.block_on(async {
                let solver = Solver::new(SolverConfig::default()).unwrap();
                let mut prev: Option<Arc<dyn Task>> = None;
                for i in 0..20 {
                    let task: Arc<dyn Task> = Arc::new(NoopTask { name: format!("n{i}"), dependency: prev.clone() });
                    prev = Some(task);
                }
                let tail = prev.unwrap();
                black_box(solver.solve(SolveRequest::new(vec![tail])).await.unwrap())
            })
        })
    });
}

fn benchmark_solve_fan_out(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    c.bench_function("solve_fan_out_of_20", |b| {
        b.iter(|| {
            rt.block_on(async {
                let solver = Solver::new(SolverConfig::default()).unwrap();
                let root: Arc<dyn Task> = Arc::new(NoopTask { name: "root".to_string(), dependency: None });
                let leaves: Vec<Arc<dyn Task>> = (0..20)
                    .map(|i| -> Arc<dyn Task> { Arc::new(NoopTask { name: format!("leaf{i}"), dependency: Some(root.clone()) }) })
                    .collect();
                black_box(solver.solve(SolveRequest::new(leaves)).await.unwrap())
            })
        })
    });
}

criterion_group!(
    benches,
    benchmark_graph_construction,
    benchmark_overall_order,
    benchmark_solve_chain,
    benchmark_solve_fan_out
);

criterion_main!(benches);
