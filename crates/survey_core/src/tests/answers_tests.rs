use chrono::{Duration, TimeZone, Utc};

use super::*;

fn three_questions() -> QuestionSet {
    QuestionSet::new(vec![
        Question::single_choice("q1", "One", ["x", "y"]),
        Question::single_choice("q2", "Two", ["x", "y"]),
        Question::single_choice("q3", "Three", ["x", "y"]),
    ])
    .expect("questions")
}

fn map(pairs: &[(&str, &str)]) -> AnswerMap {
    pairs.iter().map(|(k, v)| (*k, *v)).collect()
}

#[test]
fn step_is_first_unanswered_question() {
    let questions = three_questions();
    assert_eq!(derive_step(&questions, &AnswerMap::new()), 0);
    assert_eq!(derive_step(&questions, &map(&[("q1", "x")])), 1);
    assert_eq!(derive_step(&questions, &map(&[("q1", "x"), ("q3", "y")])), 1);
    assert_eq!(
        derive_step(&questions, &map(&[("q1", "x"), ("q2", "x"), ("q3", "y")])),
        2
    );
}

#[test]
fn larger_key_count_wins_and_ties_go_remote() {
    let local = map(&[("date_of_passing", "2024-01-01")]);
    let reconciled = reconcile(
        AnswerSet::new(local.clone(), None),
        AnswerSet::default(),
        ReconcilePolicy::LargerWins,
    );
    assert_eq!(reconciled.answers, local);
    assert_eq!(reconciled.source, AnswerSource::Local);

    let remote = map(&[("date_of_passing", "2024-01-01"), ("the_will", "...")]);
    let reconciled = reconcile(
        AnswerSet::default(),
        AnswerSet::new(remote.clone(), None),
        ReconcilePolicy::LargerWins,
    );
    assert_eq!(reconciled.answers, remote);
    assert_eq!(reconciled.source, AnswerSource::Remote);

    let tie_remote = map(&[("the_will", "remote")]);
    let reconciled = reconcile(
        AnswerSet::new(map(&[("the_will", "local")]), None),
        AnswerSet::new(tie_remote.clone(), None),
        ReconcilePolicy::LargerWins,
    );
    assert_eq!(reconciled.answers, tie_remote);
}

#[test]
fn newest_wins_prefers_fresher_smaller_map() {
    let earlier = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    let later = earlier + Duration::minutes(5);
    let local = map(&[("q1", "x")]);
    let remote = map(&[("q1", "y"), ("q2", "y")]);

    let reconciled = reconcile(
        AnswerSet::new(local.clone(), Some(later)),
        AnswerSet::new(remote.clone(), Some(earlier)),
        ReconcilePolicy::NewestWins,
    );
    assert_eq!(reconciled.answers, local);

    // Missing timestamps fall back to key counts.
    let reconciled = reconcile(
        AnswerSet::new(local, Some(later)),
        AnswerSet::new(remote.clone(), None),
        ReconcilePolicy::NewestWins,
    );
    assert_eq!(reconciled.answers, remote);
}

#[test]
fn validation_follows_question_kind() {
    let single = Question::single_choice("the_will", "2. The Will", ["Found it", "Not yet"]);
    let multi = Question::multi_choice("todo_list", "Areas", ["Household", "Money"]);
    let date = Question::date("date_of_passing", "When?");
    let text = Question::free_text("notes", "Anything else?");

    assert!(validate_answer(&single, &AnswerValue::from("Found it")).is_ok());
    assert!(matches!(
        validate_answer(&single, &AnswerValue::from("Maybe")),
        Err(AnswerError::UnknownOption { .. })
    ));
    assert!(matches!(
        validate_answer(&single, &AnswerValue::multi(["Found it"])),
        Err(AnswerError::KindMismatch { .. })
    ));

    assert!(validate_answer(&multi, &AnswerValue::multi(["Money", "Household"])).is_ok());
    assert!(validate_answer(&multi, &AnswerValue::multi(Vec::<String>::new())).is_ok());
    assert!(matches!(
        validate_answer(&multi, &AnswerValue::from("Money")),
        Err(AnswerError::KindMismatch { .. })
    ));

    assert!(validate_answer(&date, &AnswerValue::from("2024-01-01")).is_ok());
    for bad in ["2024-1-1", "01/01/2024", "2024-02-30"] {
        assert!(
            matches!(
                validate_answer(&date, &AnswerValue::from(bad)),
                Err(AnswerError::InvalidDate { .. })
            ),
            "{bad} should be rejected"
        );
    }

    assert!(validate_answer(&text, &AnswerValue::from("thank you")).is_ok());
    assert_eq!(
        validate_answer(&text, &AnswerValue::from("   ")),
        Err(AnswerError::Blank("notes".into()))
    );
}

#[test]
fn normalized_answers_are_stored_in_canonical_form() {
    let multi = Question::multi_choice("todo_list", "Areas", ["Household", "Money"]);
    let date = Question::date("date_of_passing", "When?");
    let text = Question::free_text("notes", "Anything else?");

    let raw = AnswerValue::Multi(vec!["Money".into(), "Household".into(), "Money".into()]);
    assert_eq!(
        normalize_answer(&multi, raw),
        Ok(AnswerValue::Multi(vec!["Money".into(), "Household".into()]))
    );
    assert_eq!(
        normalize_answer(&date, AnswerValue::from(" 2024-01-01 ")),
        Ok(AnswerValue::from("2024-01-01"))
    );
    assert_eq!(
        normalize_answer(&text, AnswerValue::from("  thank you \n")),
        Ok(AnswerValue::from("thank you"))
    );
    assert!(matches!(
        normalize_answer(&date, AnswerValue::from(" 2024-13-01 ")),
        Err(AnswerError::InvalidDate { .. })
    ));
}

#[test]
fn toggling_keeps_selection_order() {
    let selection = toggle_selection(&[], "Money");
    let selection = toggle_selection(&selection, "Household");
    assert_eq!(selection, vec!["Money".to_string(), "Household".to_string()]);

    let selection = toggle_selection(&selection, "Money");
    assert_eq!(selection, vec!["Household".to_string()]);
}

#[test]
fn policy_parses_from_config_strings() {
    assert_eq!("newest-wins".parse::<ReconcilePolicy>(), Ok(ReconcilePolicy::NewestWins));
    assert_eq!("LARGER_WINS".parse::<ReconcilePolicy>(), Ok(ReconcilePolicy::LargerWins));
    assert!("coin_flip".parse::<ReconcilePolicy>().is_err());
}
