//! Event payload contract tests (spec §9 open question 5: pin the exact
//! shape/ordering of each lifecycle event rather than leaving it implicit).

mod common;

use std::sync::{Arc, Mutex};

use task_graph_solver::{Event, SolveRequest, Solver, SolverConfig, Task};

use common::StubTask;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Tag {
    Start,
    Loop,
    Process,
    StatusStart,
    StatusComplete,
    TaskStart,
    TaskComplete,
    TaskError,
    Ready,
    Processed,
    Abort,
}

fn tag_of(event: &Event) -> Tag {
    match event {
        Event::Start => Tag::Start,
        Event::Loop => Tag::Loop,
        Event::Process { .. } => Tag::Process,
        Event::Abort { .. } => Tag::Abort,
        Event::StatusStart { .. } => Tag::StatusStart,
        Event::StatusComplete { .. } => Tag::StatusComplete,
        Event::TaskStart { .. } => Tag::TaskStart,
        Event::TaskComplete { .. } => Tag::TaskComplete,
        Event::TaskError { .. } => Tag::TaskError,
        Event::Ready { .. } => Tag::Ready,
        Event::Processed { .. } => Tag::Processed,
    }
}

#[tokio::test]
async fn start_is_always_the_first_event_of_a_batch() {
    let solver = Solver::new(SolverConfig::default()).unwrap();
    let seen: Arc<Mutex<Vec<Tag>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    solver.events().on(move |event| sink.lock().unwrap().push(tag_of(event)));

    let a: Arc<dyn Task> = Arc::new(StubTask::new("a"));
    solver.solve(SolveRequest::new(vec![a])).await.unwrap();

    assert_eq!(seen.lock().unwrap().first(), Some(&Tag::Start));
}

#[tokio::test]
async fn a_successful_task_fires_status_then_task_lifecycle_events_in_order() {
    let solver = Solver::new(SolverConfig::default()).unwrap();
    let seen: Arc<Mutex<Vec<Tag>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    solver.events().on(move |event| sink.lock().unwrap().push(tag_of(event)));

    let a: Arc<dyn Task> = Arc::new(StubTask::new("a"));
    solver.solve(SolveRequest::new(vec![a])).await.unwrap();

    let tags = seen.lock().unwrap().clone();
    let status_start = tags.iter().position(|t| *t == Tag::StatusStart).unwrap();
    let status_complete = tags.iter().position(|t| *t == Tag::StatusComplete).unwrap();
    let task_start = tags.iter().position(|t| *t == Tag::TaskStart).unwrap();
    let task_complete = tags.iter().position(|t| *t == Tag::TaskComplete).unwrap();
    let processed = tags.iter().position(|t| *t == Tag::Processed).unwrap();

    assert!(status_start < status_complete);
    assert!(status_complete < task_start);
    assert!(task_start < task_complete);
    assert!(task_complete < processed);
}

#[tokio::test]
async fn process_event_reports_the_post_admission_in_progress_count() {
    let solver = Solver::new(SolverConfig::default()).unwrap();
    let seen: Arc<Mutex<Vec<(Vec<String>, usize)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    solver.events().on(move |event| {
        if let Event::Process { keys, in_progress } = event {
            sink.lock().unwrap().push((keys.clone(), *in_progress));
        }
    });

    let a: Arc<dyn Task> = Arc::new(StubTask::new("a"));
    let b: Arc<dyn Task> = Arc::new(StubTask::new("b"));
    solver.solve(SolveRequest::new(vec![a, b])).await.unwrap();

    for (keys, in_progress) in seen.lock().unwrap().iter() {
        assert!(!keys.is_empty(), "an admission pass only fires when it admits at least one node");
        assert!(*in_progress >= keys.len());
    }
}

#[tokio::test]
async fn a_crashing_task_fires_task_error_instead_of_task_complete_or_ready() {
    let solver = Solver::new(SolverConfig::default()).unwrap();
    let seen: Arc<Mutex<Vec<Tag>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    solver.events().on(move |event| sink.lock().unwrap().push(tag_of(event)));

    let a: Arc<dyn Task> = Arc::new(StubTask::new("a").crashing());
    solver.solve(SolveRequest::new(vec![a])).await.unwrap();

    let tags = seen.lock().unwrap().clone();
    assert!(tags.contains(&Tag::TaskError));
    assert!(!tags.contains(&Tag::TaskComplete));
    assert!(!tags.contains(&Tag::Ready));
}

#[tokio::test]
async fn ready_fires_only_for_a_request_that_resolved_to_the_ready_state() {
    let solver = Solver::new(SolverConfig::default()).unwrap();
    let seen: Arc<Mutex<Vec<Tag>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    solver.events().on(move |event| sink.lock().unwrap().push(tag_of(event)));

    let not_ready: Arc<dyn Task> = Arc::new(StubTask::new("a"));
    let ready: Arc<dyn Task> = Arc::new(StubTask::new("b").ready());
    solver.solve(SolveRequest::new(vec![not_ready, ready])).await.unwrap();

    let ready_count = seen.lock().unwrap().iter().filter(|t| **t == Tag::Ready).count();
    assert_eq!(ready_count, 1, "only the already-ready task's request resolves with `Ready`");
}
