use super::*;

#[test]
fn default_catalogue_is_a_valid_question_set() {
    let built = QuestionSet::new(afterversed_questions()).expect("valid catalogue");
    assert_eq!(built, QuestionSet::afterversed());
    assert_eq!(built.position("where_you_are"), Some(0));
    assert_eq!(built.find("todo_list").map(|q| q.required), Some(false));
    assert_eq!(
        built.find("date_of_passing").map(|q| q.kind),
        Some(QuestionKind::Date)
    );
}

#[test]
fn rejects_duplicate_ids() {
    let err = QuestionSet::new(vec![
        Question::single_choice("the_will", "2. The Will", ["Yes", "No"]),
        Question::free_text("the_will", "Anything else?"),
    ])
    .expect_err("duplicate");
    assert_eq!(err, QuestionSetError::DuplicateId("the_will".into()));
}

#[test]
fn rejects_option_mismatches_and_empty_sets() {
    assert_eq!(QuestionSet::new(Vec::new()), Err(QuestionSetError::Empty));
    assert_eq!(
        QuestionSet::new(vec![Question::single_choice(
            "overwhelming",
            "What feels most overwhelming?",
            Vec::<String>::new(),
        )]),
        Err(QuestionSetError::MissingOptions("overwhelming".into()))
    );

    let mut dated = Question::date("date_of_passing", "When?");
    dated.options.push("yesterday".into());
    assert_eq!(
        QuestionSet::new(vec![dated]),
        Err(QuestionSetError::UnexpectedOptions("date_of_passing".into()))
    );
}

#[test]
fn progress_counts_the_question_on_screen() {
    let questions = QuestionSet::new(vec![
        Question::single_choice("q1", "One", ["a"]),
        Question::single_choice("q2", "Two", ["a"]),
        Question::single_choice("q3", "Three", ["a"]),
        Question::single_choice("q4", "Four", ["a"]),
    ])
    .expect("questions");

    assert_eq!(questions.progress_percent(0), 25.0);
    assert_eq!(questions.progress_percent(3), 100.0);
    assert_eq!(questions.progress_percent(9), 100.0);
    assert!(questions.is_last(3));
    assert!(!questions.is_last(2));
}
