use std::fs;

use chrono::{DateTime, FixedOffset, TimeZone};
use errand_core::error::StoreError;
use errand_core::store::{FileStore, TaskStore, decode_tasks, encode_tasks};
use errand_core::task::{Category, NewTask, Priority, Status, TaskPatch};
use tempfile::tempdir;

fn at(day: u32, hour: u32) -> DateTime<FixedOffset> {
    FixedOffset::east_opt(0)
        .expect("offset")
        .with_ymd_and_hms(2026, 10, day, hour, 0, 0)
        .single()
        .expect("valid instant")
}

fn dated(title: &str, due: Option<DateTime<FixedOffset>>) -> NewTask {
    NewTask {
        due_at: due,
        ..NewTask::titled(title)
    }
}

#[test]
fn added_task_is_listed_with_defaults() {
    let temp = tempdir().expect("tempdir");
    let mut store = FileStore::open(temp.path()).expect("open store");

    let task = store
        .add(dated("Pay rent", Some(at(20, 9))))
        .expect("add task");
    assert_eq!(task.id, 1);
    assert_eq!(task.status, Status::Pending);
    assert_eq!(task.priority, Priority::Medium);

    let listed = store.list(None).expect("list");
    assert_eq!(listed, vec![task]);
}

#[test]
fn list_orders_by_due_with_undated_last_and_filters_status() {
    let temp = tempdir().expect("tempdir");
    let mut store = FileStore::open(temp.path()).expect("open store");

    let undated = store.add(dated("Someday", None)).expect("add");
    let later = store.add(dated("Later", Some(at(25, 9)))).expect("add");
    let sooner = store.add(dated("Sooner", Some(at(19, 9)))).expect("add");
    let same_time = store.add(dated("Same time", Some(at(19, 9)))).expect("add");

    let ids: Vec<_> = store
        .list(None)
        .expect("list")
        .into_iter()
        .map(|t| t.id)
        .collect();
    assert_eq!(ids, vec![sooner.id, same_time.id, later.id, undated.id]);

    store
        .set_status(later.id, Status::Completed)
        .expect("complete");
    let completed = store.list(Some(Status::Completed)).expect("list completed");
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].id, later.id);
    assert_eq!(store.list(Some(Status::Pending)).expect("list").len(), 3);
}

#[test]
fn missing_id_is_not_found_and_leaves_store_unchanged() {
    let temp = tempdir().expect("tempdir");
    let mut store = FileStore::open(temp.path()).expect("open store");
    store.add(NewTask::titled("Only task")).expect("add");
    let before = fs::read_to_string(&store.tasks_path).expect("read file");

    let err = store
        .set_status(42, Status::Completed)
        .expect_err("unknown id");
    assert!(matches!(err, StoreError::NotFound(42)));
    assert!(store.get(42).expect_err("unknown id").is_not_found());
    assert!(store.update_calendar_event_id(42, Some("evt")).is_err());

    let after = fs::read_to_string(&store.tasks_path).expect("read file");
    assert_eq!(before, after);
}

#[test]
fn deleting_twice_reports_not_found() {
    let temp = tempdir().expect("tempdir");
    let mut store = FileStore::open(temp.path()).expect("open store");
    let task = store.add(NewTask::titled("Throwaway")).expect("add");

    store.delete(task.id).expect("first delete");
    assert!(store.list(None).expect("list").is_empty());
    assert!(store.delete(task.id).expect_err("second delete").is_not_found());
}

#[test]
fn blank_title_is_rejected_without_writing() {
    let temp = tempdir().expect("tempdir");
    let mut store = FileStore::open(temp.path()).expect("open store");

    let err = store.add(NewTask::titled("   ")).expect_err("blank title");
    assert!(matches!(err, StoreError::Validation(_)));
    assert!(store.list(None).expect("list").is_empty());

    let task = store.add(NewTask::titled("Real")).expect("add");
    let blank = TaskPatch {
        title: Some(String::new()),
        ..TaskPatch::default()
    };
    assert!(matches!(
        store.update(task.id, &blank),
        Err(StoreError::Validation(_))
    ));
    assert_eq!(store.get(task.id).expect("get").title, "Real");
}

#[test]
fn tasks_survive_reopen_and_reencode() {
    let temp = tempdir().expect("tempdir");
    let ist = FixedOffset::east_opt(5 * 3600 + 1800).expect("offset");
    let due = ist
        .with_ymd_and_hms(2026, 10, 23, 10, 0, 0)
        .single()
        .expect("valid");

    {
        let mut store = FileStore::open(temp.path()).expect("open store");
        let task = store
            .add(NewTask {
                description: Some("quarterly numbers".to_string()),
                due_at: Some(due),
                priority: Priority::Urgent,
                category: Some(Category::Work),
                ..NewTask::titled("Submit report")
            })
            .expect("add");
        store
            .update_calendar_event_id(task.id, Some("evt-1"))
            .expect("attach event");
        store.set_status(task.id, Status::InProgress).expect("start");
    }

    let store = FileStore::open(temp.path()).expect("reopen store");
    let tasks = store.list(None).expect("list");
    assert_eq!(tasks.len(), 1);
    let task = &tasks[0];
    assert_eq!(task.due_at, Some(due));
    assert_eq!(task.due_at.expect("due").offset(), &ist);
    assert_eq!(task.calendar_event_id.as_deref(), Some("evt-1"));
    assert_eq!(task.status, Status::InProgress);
    assert_eq!(task.category, Some(Category::Work));

    let text = encode_tasks(&tasks).expect("encode");
    assert!(text.contains("\"status\":\"in-progress\""));
    assert_eq!(decode_tasks(&text, &store.tasks_path).expect("decode"), tasks);
}

#[test]
fn next_id_is_one_past_the_highest_remaining() {
    let temp = tempdir().expect("tempdir");
    let mut store = FileStore::open(temp.path()).expect("open store");
    store.add(NewTask::titled("one")).expect("add");
    let two = store.add(NewTask::titled("two")).expect("add");
    store.delete(1).expect("delete");

    let three = store.add(NewTask::titled("three")).expect("add");
    assert_eq!(three.id, two.id + 1);

    store.delete(three.id).expect("delete highest");
    let again = store.add(NewTask::titled("again")).expect("add");
    assert_eq!(again.id, three.id);
}

#[test]
fn corrupt_file_is_a_persistence_error() {
    let temp = tempdir().expect("tempdir");
    let store = FileStore::open(temp.path()).expect("open store");
    fs::write(&store.tasks_path, "{\"id\": 1, \"title\": \"ok\"\nnot json\n").expect("corrupt");

    match store.list(None) {
        Err(StoreError::Persistence { path, .. }) => assert_eq!(path, store.tasks_path),
        other => panic!("expected persistence error, got {other:?}"),
    }
}

#[test]
fn clear_completed_returns_removed_tasks() {
    let temp = tempdir().expect("tempdir");
    let mut store = FileStore::open(temp.path()).expect("open store");
    let keep = store.add(NewTask::titled("keep")).expect("add");
    let done = store.add(NewTask::titled("done")).expect("add");
    store.set_status(done.id, Status::Completed).expect("complete");

    let removed = store.clear_completed().expect("clear");
    assert_eq!(removed.len(), 1);
    assert_eq!(removed[0].id, done.id);

    let left: Vec<_> = store.list(None).expect("list").into_iter().map(|t| t.id).collect();
    assert_eq!(left, vec![keep.id]);
    assert!(store.clear_completed().expect("clear again").is_empty());
}

#[test]
fn legacy_done_status_decodes_as_completed() {
    let temp = tempdir().expect("tempdir");
    let store = FileStore::open(temp.path()).expect("open store");
    fs::write(
        &store.tasks_path,
        "{\"id\":7,\"title\":\"Old\",\"status\":\"done\",\"created_at\":\"2026-10-01T08:00:00Z\"}\n\n",
    )
    .expect("write legacy line");

    let tasks = store.list(Some(Status::Completed)).expect("list");
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].id, 7);
    assert_eq!(tasks[0].priority, Priority::Medium);
}
