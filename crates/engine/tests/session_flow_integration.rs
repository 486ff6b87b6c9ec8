mod support;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fixup_common::protocol::{
    EditTask, Position, Range, TaskError, TaskNotification, TaskState, TextDocumentEditParams,
    TextEdit, WorkspaceEditOperation, WorkspaceEditParams,
};
use fixup_engine::error::{CollaboratorError, FixupError};
use fixup_engine::session::SessionEvent;
use fixup_engine::{DocumentStore, EditCommand, FixupConfig, SessionController};
use support::MockCollaborator;
use tokio::sync::mpsc;

const URI: &str = "file:///workspace/src/math.rs";
const CONTENT: &str = "fn add(a: i32, b: i32) -> i32 {\n    a + b\n}\n\nfn main() {}\n";
const DOCSTRING: &str = "/// Adds two numbers.\n";

fn controller_with(collaborator: Arc<MockCollaborator>) -> (Arc<SessionController>, Arc<DocumentStore>) {
    let store = Arc::new(DocumentStore::new(false));
    store.insert(URI, CONTENT).expect("document should load");
    let controller = SessionController::new(collaborator, Arc::clone(&store), FixupConfig::default());
    (controller, store)
}

fn working_task() -> EditTask {
    EditTask::new("task-1", TaskState::Working).with_selection(Range::lines(0, 0, 5, 0))
}

fn docstring_edit() -> TaskNotification {
    TaskNotification::WorkspaceEdit(WorkspaceEditParams {
        operations: vec![WorkspaceEditOperation::edit_file(
            URI,
            vec![TextEdit::insert(Position::new(0, 0), DOCSTRING)],
        )],
    })
}

fn state(id: &str, state: TaskState) -> TaskNotification {
    TaskNotification::StateChanged(EditTask::new(id, state))
}

#[tokio::test]
async fn add_docstring_then_accept_keeps_text() {
    let agent = MockCollaborator::answering(working_task()).into_arc();
    let (controller, store) = controller_with(agent.clone());

    let session = controller
        .start_session(EditCommand::instruction("Add docstring"), URI, Range::lines(0, 0, 5, 0))
        .await
        .expect("session should start");
    assert_eq!(session.task_id().as_deref(), Some("task-1"));
    assert_eq!(session.state(), TaskState::Working);
    assert_eq!(session.anchor_range(), Range::lines(0, 0, 5, 0));

    controller.handle_notification(docstring_edit()).await;
    controller.handle_notification(state("task-1", TaskState::Applied)).await;
    assert!(session.is_applied());
    assert_eq!(session.applied_action_count(), 1);

    assert!(session.accept().await);
    let document = store.get(URI).unwrap();
    assert_eq!(document.text(), format!("{DOCSTRING}{CONTENT}"));
    assert!(session.is_disposed());
    assert_eq!(session.state(), TaskState::Finished);
    assert!(controller.active_session().is_none());
    assert_eq!(
        agent.calls(),
        vec!["editTask/getFoldingRanges", "editCommands/code", "editTask/accept:task-1"]
    );
    assert_eq!(agent.requests()[0].params()["instruction"], "Add docstring");
}

#[tokio::test]
async fn add_docstring_then_undo_restores_exact_bytes() {
    let agent = MockCollaborator::answering(working_task()).into_arc();
    let (controller, store) = controller_with(agent.clone());
    let session = controller
        .start_session(EditCommand::instruction("Add docstring"), URI, Range::lines(0, 0, 5, 0))
        .await
        .unwrap();

    controller.handle_notification(docstring_edit()).await;
    controller.handle_notification(state("task-1", TaskState::Applied)).await;
    assert!(session.undo().await);

    assert_eq!(store.get(URI).unwrap().text(), CONTENT);
    assert!(session.is_disposed());
    assert!(agent.calls().contains(&"editTask/undo:task-1".to_string()));
}

#[tokio::test]
async fn folding_range_refines_anchor() {
    let agent = MockCollaborator::answering(EditTask::new("task-1", TaskState::Working))
        .with_anchor(Range::lines(0, 0, 3, 0))
        .into_arc();
    let (controller, _) = controller_with(agent.clone());
    let session = controller
        .start_session(EditCommand::DocumentCode, URI, Range::lines(1, 4, 1, 9))
        .await
        .unwrap();

    assert_eq!(session.anchor_range(), Range::lines(0, 0, 3, 0));
    assert_eq!(agent.requests()[0].range, Range::lines(0, 0, 3, 0));
    assert_eq!(agent.requests()[0].method(), "editCommands/document");
}

#[tokio::test(start_paused = true)]
async fn edit_request_times_out_into_error() {
    let agent = MockCollaborator::answering(working_task())
        .with_request_delay(Duration::from_secs(30))
        .into_arc();
    let (controller, store) = controller_with(agent.clone());
    let session = controller
        .start_session(EditCommand::GenerateTests, URI, Range::lines(0, 0, 2, 1))
        .await
        .unwrap();

    assert!(session.is_error());
    assert_eq!(session.task_id(), None);
    let message = session.error_message().unwrap();
    assert!(message.contains("timed out after 3000ms"), "{message}");
    assert_eq!(store.get(URI).unwrap().text(), CONTENT);

    // Still visible so the failure can be shown, until dismissed.
    assert!(controller.active_session().is_some());
    assert!(session.dismiss());
    assert!(controller.active_session().is_none());
}

#[tokio::test]
async fn failed_request_surfaces_message() {
    let agent =
        MockCollaborator::failing(CollaboratorError::Rejected("model unavailable".into())).into_arc();
    let (controller, _) = controller_with(agent.clone());
    let session = controller
        .start_session(EditCommand::FixProblem, URI, Range::lines(0, 0, 0, 5))
        .await
        .unwrap();

    assert!(session.is_error());
    assert!(session.error_message().unwrap().contains("model unavailable"));

    // The controller can start over right away.
    let next = controller
        .start_session(EditCommand::FixProblem, URI, Range::lines(0, 0, 0, 5))
        .await
        .unwrap();
    assert!(session.is_disposed());
    assert!(next.is_error());
}

#[tokio::test]
async fn error_push_ends_session_without_reverting() {
    let agent = MockCollaborator::answering(working_task()).into_arc();
    let (controller, store) = controller_with(agent);
    let session = controller
        .start_session(EditCommand::instruction("Add docstring"), URI, Range::lines(0, 0, 5, 0))
        .await
        .unwrap();
    controller.handle_notification(docstring_edit()).await;

    let mut failed = EditTask::new("task-1", TaskState::Error);
    failed.error = Some(TaskError { message: "rate limited".into() });
    controller.handle_notification(TaskNotification::StateChanged(failed)).await;

    assert!(session.is_error());
    assert_eq!(session.error_message().as_deref(), Some("rate limited"));
    assert!(store.get(URI).unwrap().text().starts_with(DOCSTRING));
}

#[tokio::test]
async fn starting_a_session_disposes_the_previous_one_first() {
    let agent = MockCollaborator::answering(working_task()).into_arc();
    let (controller, _) = controller_with(agent);
    let first = controller
        .start_session(EditCommand::DocumentCode, URI, Range::lines(0, 0, 2, 1))
        .await
        .unwrap();
    let mut first_events = first.subscribe();

    let second = controller
        .start_session(EditCommand::GenerateTests, URI, Range::lines(0, 0, 2, 1))
        .await
        .unwrap();

    assert!(first.is_disposed());
    assert!(!second.is_disposed());
    assert!(Arc::ptr_eq(&controller.active_session().unwrap(), &second));
    assert_eq!(first_events.recv().await.unwrap(), SessionEvent::Disposed);
}

#[tokio::test]
async fn terminal_sessions_absorb_actions() {
    let agent = MockCollaborator::answering(working_task()).into_arc();
    let (controller, _) = controller_with(agent.clone());
    let session = controller
        .start_session(EditCommand::DocumentCode, URI, Range::lines(0, 0, 2, 1))
        .await
        .unwrap();
    controller.handle_notification(state("task-1", TaskState::Applied)).await;
    assert!(session.accept().await);
    let calls = agent.calls().len();

    assert!(!session.accept().await);
    assert!(!session.cancel().await);
    assert!(!session.undo().await);
    assert!(!session.dismiss());
    session.handle_state(EditTask::new("task-1", TaskState::Working));
    assert_eq!(session.state(), TaskState::Finished);
    assert_eq!(agent.calls().len(), calls);
}

#[tokio::test]
async fn accept_and_undo_wait_for_applied() {
    let agent = MockCollaborator::answering(working_task()).into_arc();
    let (controller, _) = controller_with(agent);
    let session = controller
        .start_session(EditCommand::DocumentCode, URI, Range::lines(0, 0, 2, 1))
        .await
        .unwrap();

    assert!(!session.accept().await);
    assert!(!session.undo().await);
    assert_eq!(session.state(), TaskState::Working);
    assert!(!session.is_disposed());
}

#[tokio::test]
async fn cancel_reverses_applied_edits() {
    let agent = MockCollaborator::answering(working_task()).into_arc();
    let (controller, store) = controller_with(agent.clone());
    controller
        .start_session(EditCommand::instruction("Add docstring"), URI, Range::lines(0, 0, 5, 0))
        .await
        .unwrap();
    controller.handle_notification(docstring_edit()).await;

    assert!(controller.cancel_active_session().await);
    assert_eq!(store.get(URI).unwrap().text(), CONTENT);
    assert!(controller.active_session().is_none());
    assert!(agent.calls().contains(&"editTask/cancel:task-1".to_string()));
}

#[tokio::test]
async fn undo_survives_foreign_edits_elsewhere() {
    let agent = MockCollaborator::answering(working_task()).into_arc();
    let (controller, store) = controller_with(agent);
    let session = controller
        .start_session(EditCommand::instruction("Add docstring"), URI, Range::lines(0, 0, 5, 0))
        .await
        .unwrap();
    controller
        .handle_notification(TaskNotification::TextDocumentEdit(TextDocumentEditParams {
            uri: URI.into(),
            edits: vec![TextEdit::replace(Range::lines(1, 4, 1, 9), "a.wrapping_add(b)")],
        }))
        .await;
    controller.handle_notification(state("task-1", TaskState::Applied)).await;

    let document = store.get(URI).unwrap();
    document.edit(0, 0, "// header\n");
    let end = document.len();
    document.edit(end, 0, "// footer\n");
    assert_eq!(session.foreign_edit_count(), 2);

    assert!(session.undo().await);
    assert_eq!(document.text(), format!("// header\n{CONTENT}// footer\n"));
}

#[tokio::test]
async fn one_batch_is_one_update() {
    let agent = MockCollaborator::answering(working_task()).into_arc();
    let (controller, store) = controller_with(agent);
    let session = controller
        .start_session(EditCommand::DocumentCode, URI, Range::lines(0, 0, 5, 0))
        .await
        .unwrap();

    let updates = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&updates);
    let origin = session.origin().to_string();
    let _subscription = store
        .get(URI)
        .unwrap()
        .observe_updates(move |tag| {
            if tag == Some(origin.as_bytes()) {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        })
        .unwrap();

    controller
        .handle_notification(TaskNotification::WorkspaceEdit(WorkspaceEditParams {
            operations: vec![WorkspaceEditOperation::edit_file(
                URI,
                vec![
                    TextEdit::insert(Position::new(0, 0), DOCSTRING),
                    TextEdit::replace(Range::lines(1, 4, 1, 9), "a.wrapping_add(b)"),
                    TextEdit::insert(Position::new(4, 0), "/// Entry point.\n"),
                ],
            )],
        }))
        .await;

    assert_eq!(updates.load(Ordering::SeqCst), 1);
    assert_eq!(session.applied_action_count(), 3);
    assert_eq!(session.foreign_edit_count(), 0);
    assert_eq!(
        store.get(URI).unwrap().text(),
        "/// Adds two numbers.\nfn add(a: i32, b: i32) -> i32 {\n    a.wrapping_add(b)\n}\n\n/// Entry point.\nfn main() {}\n"
    );
}

#[tokio::test]
async fn bad_edit_is_reported_and_rest_of_batch_applies() {
    let agent = MockCollaborator::answering(working_task()).into_arc();
    let (controller, store) = controller_with(agent);
    let session = controller
        .start_session(EditCommand::DocumentCode, URI, Range::lines(0, 0, 5, 0))
        .await
        .unwrap();
    let mut events = session.subscribe();

    controller
        .handle_notification(TaskNotification::WorkspaceEdit(WorkspaceEditParams {
            operations: vec![WorkspaceEditOperation::edit_file(
                URI,
                vec![
                    TextEdit::replace(Range::lines(40, 0, 41, 0), "nope").with_id("far"),
                    TextEdit::insert(Position::new(0, 0), DOCSTRING).with_id("doc"),
                ],
            )],
        }))
        .await;

    assert_eq!(session.applied_action_count(), 1);
    let failures = session.failures();
    assert_eq!(failures.len(), 1);
    assert!(matches!(
        &failures[0],
        FixupError::EditCreationFailed { edit_id: Some(id), .. } if id == "far"
    ));
    assert!(!session.is_error());
    assert!(store.get(URI).unwrap().text().starts_with(DOCSTRING));
    assert!(matches!(events.recv().await.unwrap(), SessionEvent::EditFailed(_)));
    assert_eq!(
        events.recv().await.unwrap(),
        SessionEvent::EditsApplied { uri: URI.into(), count: 1 }
    );
}

#[tokio::test]
async fn reject_edit_reverses_only_that_edit() {
    let agent = MockCollaborator::answering(working_task()).into_arc();
    let (controller, store) = controller_with(agent);
    let session = controller
        .start_session(EditCommand::DocumentCode, URI, Range::lines(0, 0, 5, 0))
        .await
        .unwrap();
    controller
        .handle_notification(TaskNotification::WorkspaceEdit(WorkspaceEditParams {
            operations: vec![WorkspaceEditOperation::edit_file(
                URI,
                vec![
                    TextEdit::insert(Position::new(0, 0), DOCSTRING).with_id("doc"),
                    TextEdit::insert(Position::new(4, 0), "/// Entry point.\n").with_id("main"),
                ],
            )],
        }))
        .await;
    controller.handle_notification(state("task-1", TaskState::Applied)).await;

    assert!(session.reject_edit("main"));
    assert!(session.accept_edit("doc"));
    assert!(!session.reject_edit("main"));
    assert!(session.edits().is_empty());
    assert_eq!(session.applied_action_count(), 1);
    assert_eq!(store.get(URI).unwrap().text(), format!("{DOCSTRING}{CONTENT}"));
}

#[tokio::test]
async fn diff_shows_session_changes_without_touching_document() {
    let agent = MockCollaborator::answering(working_task()).into_arc();
    let (controller, store) = controller_with(agent);
    let session = controller
        .start_session(EditCommand::instruction("Add docstring"), URI, Range::lines(0, 0, 5, 0))
        .await
        .unwrap();
    controller.handle_notification(docstring_edit()).await;
    let document = store.get(URI).unwrap();
    document.edit(document.len(), 0, "// later\n");

    let diff = session.diff().unwrap();
    assert_eq!(diff.before, format!("{CONTENT}// later\n"));
    assert_eq!(diff.after, document.text());
    assert_eq!(diff.line_counts(), (1, 0));
    assert!(diff.unified().contains("+/// Adds two numbers."));
    assert_eq!(document.text(), format!("{DOCSTRING}{CONTENT}// later\n"));
    assert_eq!(session.diffs().len(), 1);
}

#[tokio::test]
async fn pushes_for_other_tasks_are_ignored() {
    let agent = MockCollaborator::answering(working_task()).into_arc();
    let (controller, _) = controller_with(agent);
    let session = controller
        .start_session(EditCommand::DocumentCode, URI, Range::lines(0, 0, 5, 0))
        .await
        .unwrap();

    controller.handle_notification(state("someone-else", TaskState::Applied)).await;
    controller
        .handle_notification(TaskNotification::TaskDeleted(EditTask::new("someone-else", TaskState::Finished)))
        .await;
    assert_eq!(session.state(), TaskState::Working);
    assert!(!session.is_disposed());
}

async fn start_in_background(
    controller: &Arc<SessionController>,
) -> tokio::task::JoinHandle<Arc<fixup_engine::FixupSession>> {
    let starter = Arc::clone(controller);
    let start = tokio::spawn(async move {
        starter
            .start_session(EditCommand::DocumentCode, URI, Range::lines(0, 0, 5, 0))
            .await
            .expect("session should start")
    });
    while controller.active_session().is_none() {
        tokio::task::yield_now().await;
    }
    start
}

#[tokio::test(start_paused = true)]
async fn pushes_for_a_previous_task_do_not_reach_a_pending_session() {
    let answer = EditTask::new("task-2", TaskState::Working).with_selection(Range::lines(0, 0, 5, 0));
    let agent = MockCollaborator::answering(answer).with_request_delay(Duration::from_millis(500)).into_arc();
    let (controller, _) = controller_with(agent);
    let start = start_in_background(&controller).await;

    controller
        .handle_notification(TaskNotification::TaskDeleted(EditTask::new("task-1", TaskState::Finished)))
        .await;
    controller.handle_notification(state("task-1", TaskState::Applied)).await;
    let session = controller.active_session().unwrap();
    assert!(!session.is_disposed());
    assert_eq!(session.state(), TaskState::Pending);

    let session = start.await.unwrap();
    assert_eq!(session.task_id().as_deref(), Some("task-2"));
    assert_eq!(session.state(), TaskState::Working);
    assert!(!session.is_disposed());
    assert!(controller.active_session().is_some());
}

#[tokio::test(start_paused = true)]
async fn own_pushes_during_the_request_apply_once_answered() {
    let answer = EditTask::new("task-2", TaskState::Working).with_selection(Range::lines(0, 0, 5, 0));
    let agent = MockCollaborator::answering(answer).with_request_delay(Duration::from_millis(500)).into_arc();
    let (controller, _) = controller_with(agent);
    let start = start_in_background(&controller).await;

    controller.handle_notification(state("task-1", TaskState::Finished)).await;
    controller.handle_notification(state("task-2", TaskState::Applied)).await;

    let session = start.await.unwrap();
    assert_eq!(session.state(), TaskState::Applied);
    assert!(!session.is_disposed());
}

#[tokio::test]
async fn transient_states_in_any_order_still_reach_applied() {
    let agent = MockCollaborator::answering(working_task()).into_arc();
    let (controller, _) = controller_with(agent);
    let session = controller
        .start_session(EditCommand::DocumentCode, URI, Range::lines(0, 0, 5, 0))
        .await
        .unwrap();
    let mut events = session.subscribe();

    for pushed in [TaskState::Applying, TaskState::Formatting, TaskState::Inserting, TaskState::Applied] {
        controller.handle_notification(state("task-1", pushed)).await;
    }
    assert!(session.is_applied());

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let SessionEvent::StateChanged(state) = event {
            seen.push(state);
        }
    }
    assert_eq!(
        seen,
        vec![TaskState::Applying, TaskState::Formatting, TaskState::Inserting, TaskState::Applied]
    );
}

#[tokio::test]
async fn working_may_jump_straight_to_applied() {
    let agent = MockCollaborator::answering(working_task()).into_arc();
    let (controller, _) = controller_with(agent);
    let session = controller
        .start_session(EditCommand::DocumentCode, URI, Range::lines(0, 0, 5, 0))
        .await
        .unwrap();
    controller.handle_notification(docstring_edit()).await;
    controller.handle_notification(state("task-1", TaskState::Applied)).await;

    assert!(session.is_applied());
    assert_eq!(session.applied_action_count(), 1);
    assert!(session.undo().await);
}

#[tokio::test]
async fn task_deleted_disposes_without_reverting() {
    let agent = MockCollaborator::answering(working_task()).into_arc();
    let (controller, store) = controller_with(agent);
    let session = controller
        .start_session(EditCommand::instruction("Add docstring"), URI, Range::lines(0, 0, 5, 0))
        .await
        .unwrap();
    controller.handle_notification(docstring_edit()).await;
    controller
        .handle_notification(TaskNotification::TaskDeleted(EditTask::new("task-1", TaskState::Finished)))
        .await;

    assert!(session.is_disposed());
    assert!(store.get(URI).unwrap().text().starts_with(DOCSTRING));
    assert!(controller.active_session().is_none());
}

#[tokio::test]
async fn pump_applies_pushes_in_arrival_order() {
    let agent = MockCollaborator::answering(working_task()).into_arc();
    let (controller, store) = controller_with(agent);
    let session = controller
        .start_session(EditCommand::DocumentCode, URI, Range::lines(0, 0, 5, 0))
        .await
        .unwrap();

    let (pushes, receiver) = mpsc::unbounded_channel();
    let pump = controller.spawn_notification_pump(receiver);
    for line in ["// one\n", "// two\n"] {
        pushes
            .send(TaskNotification::TextDocumentEdit(TextDocumentEditParams {
                uri: URI.into(),
                edits: vec![TextEdit::insert(Position::new(0, 0), line)],
            }))
            .unwrap();
    }
    pushes.send(state("task-1", TaskState::Applied)).unwrap();
    drop(pushes);
    pump.await.unwrap();

    assert!(session.is_applied());
    assert!(store.get(URI).unwrap().text().starts_with("// two\n// one\nfn add"));
}

#[tokio::test]
async fn retry_cancels_and_starts_with_new_instruction() {
    let agent = MockCollaborator::answering(working_task()).into_arc();
    let (controller, store) = controller_with(agent.clone());
    let first = controller
        .start_session(EditCommand::instruction("Add docstring"), URI, Range::lines(0, 0, 5, 0))
        .await
        .unwrap();
    controller.handle_notification(docstring_edit()).await;

    let second = controller.retry(&first, Some("Add a one-line docstring".into())).await.unwrap();

    assert!(first.is_disposed());
    assert_eq!(store.get(URI).unwrap().text(), CONTENT);
    assert!(Arc::ptr_eq(&controller.active_session().unwrap(), &second));
    assert_eq!(
        second.command(),
        &EditCommand::instruction("Add a one-line docstring")
    );
    let requests = agent.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].range, Range::lines(0, 0, 5, 0));
}

#[tokio::test]
async fn disposed_controller_refuses_new_sessions() {
    let agent = MockCollaborator::answering(working_task()).into_arc();
    let (controller, _) = controller_with(agent);
    let session = controller
        .start_session(EditCommand::DocumentCode, URI, Range::lines(0, 0, 5, 0))
        .await
        .unwrap();

    controller.dispose();
    assert!(session.is_disposed());
    let refused = controller
        .start_session(EditCommand::DocumentCode, URI, Range::lines(0, 0, 5, 0))
        .await
        .unwrap_err();
    assert!(matches!(refused, FixupError::InvalidSessionState { .. }));
}

#[tokio::test]
async fn closing_the_document_disposes_its_session() {
    let agent = MockCollaborator::answering(working_task()).into_arc();
    let (controller, _) = controller_with(agent);
    let session = controller
        .start_session(EditCommand::DocumentCode, URI, Range::lines(0, 0, 5, 0))
        .await
        .unwrap();

    controller.document_closed("/workspace/src/math.rs");
    assert!(session.is_disposed());
    assert!(controller.active_session().is_none());
}
