use chrono::{TimeZone, Utc};

use crate::{
    domain::{AnswerMap, AnswerValue, SessionId},
    error::{ErrorKind, ServiceError},
    protocol::{parse_service_timestamp, SessionDetailResponse, SurveyPayload},
};

#[test]
fn answer_values_use_plain_json_shapes() {
    let answers: AnswerMap = [
        ("the_will", AnswerValue::from("We don't think there is a Will.")),
        (
            "todo_list",
            AnswerValue::multi(["Digital", "Money", "Digital"]),
        ),
    ]
    .into_iter()
    .collect();

    let json = serde_json::to_value(&answers).expect("serialize");
    assert_eq!(
        json,
        serde_json::json!({
            "the_will": "We don't think there is a Will.",
            "todo_list": ["Digital", "Money"],
        })
    );

    let parsed: AnswerMap = serde_json::from_value(json).expect("deserialize");
    assert_eq!(parsed, answers);
}

#[test]
fn with_answer_leaves_the_original_map_untouched() {
    let original = AnswerMap::new();
    let next = original.with_answer("where_you_are", AnswerValue::from("It has been a week or two."));
    assert!(original.is_empty());
    assert_eq!(next.answered_count(), 1);
    assert!(next.contains("where_you_are"));
}

#[test]
fn session_detail_tolerates_null_survey_data_and_sqlite_timestamps() {
    let detail: SessionDetailResponse = serde_json::from_value(serde_json::json!({
        "session_id": 42,
        "survey_data": null,
        "completed_at": null,
        "created_at": "2024-03-01 09:15:00",
        "updated_at": "2024-03-01T09:15:00.123456+00:00"
    }))
    .expect("detail");

    assert_eq!(detail.session_id, SessionId(42));
    assert!(detail.answers().is_empty());
    assert!(detail.completed_at_utc().is_none());
    assert_eq!(
        detail.created_at.as_deref().and_then(parse_service_timestamp),
        Some(Utc.with_ymd_and_hms(2024, 3, 1, 9, 15, 0).unwrap())
    );
}

#[test]
fn survey_payload_keeps_unknown_fields() {
    let payload: SurveyPayload = serde_json::from_value(serde_json::json!({
        "answers": {"the_will": "I'm not sure, and it's stressful to think about."},
        "timestamp": "2024-05-02T10:00:00Z",
        "source": "kiosk"
    }))
    .expect("payload");

    assert_eq!(payload.extra.get("source"), Some(&serde_json::json!("kiosk")));
    assert_eq!(
        payload.submitted_at(),
        Some(Utc.with_ymd_and_hms(2024, 5, 2, 10, 0, 0).unwrap())
    );
}

#[test]
fn status_codes_map_to_error_kinds() {
    assert_eq!(ServiceError::from_status(404, "").kind, ErrorKind::NotFound);
    assert_eq!(ServiceError::from_status(422, "bad").kind, ErrorKind::Validation);
    assert_eq!(ServiceError::from_status(503, "").kind, ErrorKind::Transport);
    assert_eq!(
        ServiceError::from_status(500, "  ").message,
        "request failed with status 500"
    );
    assert_eq!(ServiceError::from_status(404, "").status, Some(404));
}
