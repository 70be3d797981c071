mod helpers;

use chrono::Duration;
use helpers::{insert_task, t0, test_db};
use recall_mate::tasks::store::{
    count_by_status, create_task, delete_task, fetch_due_candidates, fetch_in_window, get_task,
    list_tasks, reschedule, set_status,
};
use recall_mate::tasks::{NewTask, TaskStatus};

#[test]
fn created_task_reads_back() {
    let conn = test_db();
    let task = create_task(
        &conn,
        &NewTask {
            title: "  Call the dentist ".into(),
            description: Some("before noon".into()),
            scheduled_at: Some(t0()),
            ..Default::default()
        },
    )
    .unwrap();

    assert_eq!(task.title, "Call the dentist");
    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(task.scheduled_at, Some(t0()));

    let fetched = get_task(&conn, &task.id).unwrap().unwrap();
    assert_eq!(fetched, task);
}

#[test]
fn blank_title_is_rejected() {
    let conn = test_db();
    let err = create_task(
        &conn,
        &NewTask {
            title: "   ".into(),
            ..Default::default()
        },
    )
    .unwrap_err();
    assert!(err.to_string().contains("title"));
}

#[test]
fn candidates_are_pending_and_scheduled_only() {
    let conn = test_db();
    let due = insert_task(&conn, "due", Some(t0()));
    let _unscheduled = insert_task(&conn, "whenever", None);
    let done = insert_task(&conn, "done", Some(t0()));
    set_status(&conn, &done, TaskStatus::Completed).unwrap();

    let ids: Vec<String> = fetch_due_candidates(&conn)
        .unwrap()
        .into_iter()
        .map(|t| t.id)
        .collect();
    assert_eq!(ids, vec![due]);
}

#[test]
fn window_query_is_inclusive_at_both_ends() {
    let conn = test_db();
    let early = insert_task(&conn, "early edge", Some(t0() - Duration::seconds(30)));
    let late = insert_task(&conn, "late edge", Some(t0() + Duration::seconds(60)));
    let _outside = insert_task(&conn, "outside", Some(t0() + Duration::milliseconds(60_001)));
    let _before = insert_task(&conn, "before", Some(t0() - Duration::milliseconds(30_001)));

    let ids: Vec<String> = fetch_in_window(
        &conn,
        t0() - Duration::seconds(30),
        t0() + Duration::seconds(60),
    )
    .unwrap()
    .into_iter()
    .map(|t| t.id)
    .collect();
    assert_eq!(ids, vec![early, late]);
}

#[test]
fn mutations_report_invalidating_changes() {
    let conn = test_db();
    let id = insert_task(&conn, "stretch", Some(t0()));

    let change = set_status(&conn, &id, TaskStatus::Completed).unwrap();
    assert!(change.invalidates_notification());
    let task = get_task(&conn, &id).unwrap().unwrap();
    assert!(task.completed_at.is_some());

    let change = set_status(&conn, &id, TaskStatus::Pending).unwrap();
    assert!(!change.invalidates_notification());

    let change = reschedule(&conn, &id, t0() + Duration::minutes(10)).unwrap();
    assert!(change.invalidates_notification());

    let change = delete_task(&conn, &id).unwrap();
    assert!(change.invalidates_notification());
    assert!(get_task(&conn, &id).unwrap().is_none());
}

#[test]
fn reschedule_returns_task_to_pending() {
    let conn = test_db();
    let id = insert_task(&conn, "water plants", Some(t0()));
    set_status(&conn, &id, TaskStatus::Snoozed).unwrap();

    reschedule(&conn, &id, t0() + Duration::minutes(15)).unwrap();
    let task = get_task(&conn, &id).unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(task.scheduled_at, Some(t0() + Duration::minutes(15)));
    assert!(task.completed_at.is_none());
}

#[test]
fn unknown_ids_are_errors() {
    let conn = test_db();
    assert!(set_status(&conn, "nope", TaskStatus::Cancelled).is_err());
    assert!(reschedule(&conn, "nope", t0()).is_err());
    assert!(delete_task(&conn, "nope").is_err());
}

#[test]
fn list_and_count_by_status() {
    let conn = test_db();
    let a = insert_task(&conn, "a", None);
    insert_task(&conn, "b", None);
    set_status(&conn, &a, TaskStatus::Cancelled).unwrap();

    assert_eq!(list_tasks(&conn, None).unwrap().len(), 2);
    assert_eq!(list_tasks(&conn, Some(TaskStatus::Pending)).unwrap().len(), 1);

    let counts = count_by_status(&conn).unwrap();
    assert_eq!(
        counts,
        vec![
            (TaskStatus::Pending, 1),
            (TaskStatus::Completed, 0),
            (TaskStatus::Cancelled, 1),
            (TaskStatus::Snoozed, 0),
        ]
    );
}
