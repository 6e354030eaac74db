mod common;

use common::*;
use stacktest::engine::BuiltinEngine;
use stacktest::model::{Context, StoredTestCase};
use stacktest::progress::{NullSink, ProgressEvent, ProgressLog};
use stacktest::report::ReportSection;
use stacktest::runner::BulkTester;
use stacktest::store::{QuestionStore, TestCaseStore};

fn stored(cases: Vec<stacktest::model::TestCase>) -> Vec<StoredTestCase> {
    cases
        .into_iter()
        .enumerate()
        .map(|(i, case)| StoredTestCase {
            testcase: i as u32 + 1,
            case,
        })
        .collect()
}

fn variant_seeds(log: &ProgressLog) -> Vec<Option<i64>> {
    log.variant_results()
        .map(|e| match e {
            ProgressEvent::VariantResult { seed, .. } => *seed,
            _ => unreachable!(),
        })
        .collect()
}

// =============================================================================
// END-TO-END SCENARIOS
// =============================================================================

#[test]
fn scenario_a_implicit_variant_passes() {
    let mut bank = bank();
    let q1 = QuestionBuilder::new(1, "Q1")
        .only_prt("ans1", "{@a@}", "ok", "wrong")
        .build();
    bank.add_question(q1.clone());
    bank.add_test_case(1, case("{@a@}", "ans1", 1.0, 0.0, "ok"));

    let engine = BuiltinEngine::default();
    let mut env = RecordingEnvironment::default();
    let mut tester = BulkTester::new(&bank, &bank, &engine, &mut env);

    let tests = bank.load_test_cases(1).unwrap();
    let outcome = tester.test_question(&q1, &tests, None).unwrap();
    assert!(outcome.passed);
    assert_eq!(outcome.message(), "passes=1,fails=0");

    let (all_passed, report) = tester
        .run_all_tests_for_context(&context(), &mut NullSink)
        .unwrap();
    assert!(all_passed);
    assert!(report.is_empty());
}

#[test]
fn scenario_b_seed_cache_runs_per_seed_without_tests() {
    let mut bank = bank();
    bank.add_question(QuestionBuilder::new(2, "Q2").seeds(&[123, 456]).build());

    let engine = BuiltinEngine::default();
    let mut env = RecordingEnvironment::default();
    let mut log = ProgressLog::new();
    let (all_passed, report) = BulkTester::new(&bank, &bank, &engine, &mut env)
        .run_all_tests_for_context(&context(), &mut log)
        .unwrap();

    assert!(all_passed);
    let cached: Vec<_> = log
        .seed_caches()
        .map(|e| match e {
            ProgressEvent::SeedCache { seed, .. } => *seed,
            _ => unreachable!(),
        })
        .collect();
    assert_eq!(cached, vec![Some(123), Some(456)]);
    assert_eq!(log.variant_results().count(), 0);
    assert_eq!(report.notests.len(), 1);
    assert_eq!(report.notests[0].question.question, 2);
    assert!(report.failingtests.is_empty());
}

#[test]
fn scenario_c_upgrade_failure_is_isolated() {
    let mut bank = bank();
    bank.add_question(
        QuestionBuilder::new(3, "Q3")
            .version(Some("2010010100"))
            .general_feedback("")
            .build(),
    );
    bank.add_test_case(3, mismatched_case());
    bank.add_question(QuestionBuilder::new(5, "Q5").build());
    bank.add_test_case(5, passing_case());

    let engine = BuiltinEngine::default();
    let mut env = RecordingEnvironment::default();
    let mut log = ProgressLog::new();
    let (all_passed, report) = BulkTester::new(&bank, &bank, &engine, &mut env)
        .run_all_tests_for_context(&context(), &mut log)
        .unwrap();

    assert!(!all_passed);
    let mentions = report.mentions(3);
    assert_eq!(mentions.len(), 1);
    assert_eq!(mentions[0].0, ReportSection::FailingUpgrades);
    assert!(mentions[0]
        .1
        .message
        .as_deref()
        .unwrap()
        .contains("version 2014010100 or later is required"));

    // Nothing was instantiated for Q3; Q5 ran as usual.
    for event in &log.events {
        match event {
            ProgressEvent::SeedCache { question, .. }
            | ProgressEvent::VariantResult { question, .. }
            | ProgressEvent::Question { question, .. } => assert_ne!(question.question, 3),
            _ => {}
        }
    }
    assert_eq!(log.seed_caches().count(), 1);
    assert_eq!(engine.evaluations(), 1);
    assert!(report.mentions(5).is_empty());
}

#[test]
fn scenario_d_mismatched_score_fails_the_variant() {
    let mut bank = bank();
    let q4 = QuestionBuilder::new(4, "Q4").seeds(&[7]).build();
    bank.add_question(q4.clone());
    bank.add_test_case(4, mismatched_case());

    let engine = BuiltinEngine::default();
    let mut env = RecordingEnvironment::default();
    let mut tester = BulkTester::new(&bank, &bank, &engine, &mut env);

    let tests = bank.load_test_cases(4).unwrap();
    let outcome = tester.test_question(&q4, &tests, Some(7)).unwrap();
    assert!(!outcome.passed);
    assert_eq!(outcome.message(), "passes=0,fails=1");

    let (all_passed, report) = tester
        .run_all_tests_for_context(&context(), &mut NullSink)
        .unwrap();
    assert!(!all_passed);
    assert_eq!(report.failingtests.len(), 1);
    let entry = &report.failingtests[0];
    assert_eq!(entry.seed, Some(7));
    assert_eq!(entry.message.as_deref(), Some("passes=0,fails=1"));
    assert_eq!(entry.to_string(), "Course: Calculus Q4 seed 7: passes=0,fails=1");
    assert_eq!(entry.link.to_string(), "stacktest preview --question 4 --seed 7");
}

// =============================================================================
// VARIANTS
// =============================================================================

#[test]
fn one_variant_per_distinct_deployed_seed() {
    let mut bank = bank();
    bank.add_question(QuestionBuilder::new(1, "A").seeds(&[5, 6, 5, 7]).build());
    bank.add_question(QuestionBuilder::new(2, "B").build());
    bank.add_test_case(1, passing_case());
    bank.add_test_case(2, passing_case());

    let engine = BuiltinEngine::default();
    let mut env = RecordingEnvironment::default();
    let mut log = ProgressLog::new();
    let (all_passed, _) = BulkTester::new(&bank, &bank, &engine, &mut env)
        .run_all_tests_for_context(&context(), &mut log)
        .unwrap();

    assert!(all_passed);
    assert_eq!(variant_seeds(&log), vec![Some(5), Some(6), Some(7), None]);
}

#[test]
fn test_question_is_deterministic() {
    let question = QuestionBuilder::new(1, "A").seeds(&[42]).build();
    let tests = stored(vec![passing_case(), wrong_answer_case(), mismatched_case()]);
    let bank = bank();

    let first_engine = BuiltinEngine::default();
    let second_engine = BuiltinEngine::default();
    let mut env = RecordingEnvironment::default();
    let first = BulkTester::new(&bank, &bank, &first_engine, &mut env)
        .run_variant(&question, &tests, Some(42))
        .unwrap();
    let again = BulkTester::new(&bank, &bank, &first_engine, &mut env)
        .run_variant(&question, &tests, Some(42))
        .unwrap();
    let fresh = BulkTester::new(&bank, &bank, &second_engine, &mut env)
        .run_variant(&question, &tests, Some(42))
        .unwrap();

    assert_eq!(first, again);
    assert_eq!(first, fresh);
    assert_eq!((first.outcome.passes, first.outcome.fails), (2, 1));
    let failing: Vec<_> = first
        .results
        .iter()
        .filter(|(_, r)| !r.passed)
        .map(|(id, _)| *id)
        .collect();
    assert_eq!(failing, vec![3]);
}

#[test]
fn runtime_error_fails_a_variant_whose_tests_pass() {
    let question = QuestionBuilder::new(1, "A")
        .general_feedback("Compare with {@missing@}.")
        .build();
    let tests = stored(vec![passing_case()]);
    let bank = bank();
    let engine = BuiltinEngine::default();
    let mut env = RecordingEnvironment::default();

    let outcome = BulkTester::new(&bank, &bank, &engine, &mut env)
        .test_question(&question, &tests, None)
        .unwrap();
    assert!(!outcome.passed);
    assert_eq!((outcome.passes, outcome.fails), (1, 0));
    assert_eq!(
        outcome.message(),
        "passes=1,fails=0; runtime errors: castext: unknown variable 'missing'"
    );
}

#[test]
fn question_text_error_fails_the_variant_and_the_run() {
    let mut bank = bank();
    bank.add_question(
        QuestionBuilder::new(1, "A")
            .question_text("Type {@typo@}: [[input:ans1]] [[validation:ans1]]")
            .question_note("a={@a@}")
            .seeds(&[3])
            .build(),
    );
    bank.add_test_case(1, passing_case());

    let engine = BuiltinEngine::default();
    let mut env = RecordingEnvironment::default();
    let mut log = ProgressLog::new();
    let (all_passed, report) = BulkTester::new(&bank, &bank, &engine, &mut env)
        .run_all_tests_for_context(&context(), &mut log)
        .unwrap();

    assert!(!all_passed);
    assert_eq!(report.failingtests.len(), 1);
    assert_eq!(
        report.failingtests[0].message.as_deref(),
        Some("passes=1,fails=0; runtime errors: castext: unknown variable 'typo'")
    );
}

#[test]
fn uninstantiable_variant_is_folded_into_the_report() {
    let mut bank = bank();
    let mut broken = QuestionBuilder::new(1, "A").build();
    broken.variables[0].name = "2a".to_string();
    bank.add_question(broken);
    bank.add_test_case(1, passing_case());
    bank.add_question(QuestionBuilder::new(2, "B").build());
    bank.add_test_case(2, passing_case());

    let engine = BuiltinEngine::default();
    let mut env = RecordingEnvironment::default();
    let mut log = ProgressLog::new();
    let (all_passed, report) = BulkTester::new(&bank, &bank, &engine, &mut env)
        .run_all_tests_for_context(&context(), &mut log)
        .unwrap();

    assert!(!all_passed);
    assert_eq!(report.failingtests.len(), 1);
    let message = report.failingtests[0].message.as_deref().unwrap();
    assert!(message.starts_with("passes=0,fails=0; runtime errors: "));
    assert!(message.contains("'2a' is not an identifier"));
    assert_eq!(log.variant_results().count(), 2);
}

#[test]
fn seeding_the_cache_twice_is_idempotent() {
    let question = QuestionBuilder::new(1, "A").seeds(&[9]).build();
    let bank = bank();
    let engine = BuiltinEngine::default();
    let mut env = RecordingEnvironment::default();
    let mut tester = BulkTester::new(&bank, &bank, &engine, &mut env);

    let first = tester.seed_cache(&question, Some(9)).unwrap();
    let second = tester.seed_cache(&question, Some(9)).unwrap();
    assert_eq!(first, second);
    assert!(second.runtime_errors.is_empty());
    assert_eq!(first.seed, 9);
    assert!(!first.rendered.contains("runtests"));
    drop(tester);
    assert_eq!(engine.evaluations(), 1);
}

#[test]
fn seed_override_never_touches_the_stored_question() {
    let mut bank = bank();
    bank.add_question(QuestionBuilder::new(1, "A").seeds(&[3, 4]).build());
    bank.add_test_case(1, passing_case());

    let engine = BuiltinEngine::default();
    let mut env = RecordingEnvironment::default();
    BulkTester::new(&bank, &bank, &engine, &mut env)
        .run_all_tests_for_context(&context(), &mut NullSink)
        .unwrap();

    let stored = bank.load_question(1).unwrap();
    assert_eq!(stored.forced_seed, None);
    assert_eq!(stored.effective_seed(), 3);
}

// =============================================================================
// TRAVERSAL AND ENVIRONMENT
// =============================================================================

#[test]
fn environment_is_consulted_around_every_variant() {
    let mut bank = bank();
    bank.add_question(QuestionBuilder::new(1, "A").seeds(&[1, 2]).build());
    bank.add_test_case(1, passing_case());

    let engine = BuiltinEngine::default();
    let mut env = RecordingEnvironment::default();
    BulkTester::new(&bank, &bank, &engine, &mut env)
        .run_all_tests_for_context(&context(), &mut NullSink)
        .unwrap();

    // Two seeds, each seeded into the cache and then tested.
    assert_eq!(env.extensions, 4);
    assert_eq!(env.after, 4);
    assert_eq!(env.flushes, 8);
}

#[test]
fn exhausted_environment_aborts_the_run() {
    let mut bank = bank();
    bank.add_question(QuestionBuilder::new(1, "A").seeds(&[1, 2]).build());
    bank.add_test_case(1, passing_case());

    let engine = BuiltinEngine::default();
    let mut env = RecordingEnvironment {
        limit: Some(1),
        ..RecordingEnvironment::default()
    };
    let err = BulkTester::new(&bank, &bank, &engine, &mut env)
        .run_all_tests_for_context(&context(), &mut NullSink)
        .unwrap_err();
    assert!(err.is_fatal());
    assert!(err.to_string().contains("time budget exhausted"));
}

#[test]
fn categories_and_questions_run_in_order() {
    let mut bank = bank();
    bank.add_category(category(11, "Integration"));
    bank.add_category(category(12, "Essays"));
    bank.add_question(QuestionBuilder::new(1, "Zeta").build());
    bank.add_question(QuestionBuilder::new(2, "Alpha").build());
    bank.add_question(QuestionBuilder::new(3, "Beta").category(11).build());
    bank.add_question(QuestionBuilder::new(4, "Essay").category(12).qtype("essay").build());

    let engine = BuiltinEngine::default();
    let mut env = RecordingEnvironment::default();
    let mut log = ProgressLog::new();
    let (_, report) = BulkTester::new(&bank, &bank, &engine, &mut env)
        .run_all_tests_for_context(&context(), &mut log)
        .unwrap();

    let headings: Vec<_> = log
        .events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::Category {
                name,
                question_count,
            } => Some((name.as_str(), *question_count)),
            _ => None,
        })
        .collect();
    assert_eq!(headings, vec![("Differentiation", 2), ("Integration", 1)]);

    let names: Vec<_> = report.notests.iter().map(|e| e.question.name.as_str()).collect();
    assert_eq!(names, vec!["Alpha", "Zeta", "Beta"]);
}

#[test]
fn missing_general_feedback_is_reported_but_not_a_failure() {
    let mut bank = bank();
    bank.add_question(QuestionBuilder::new(1, "A").general_feedback("  ").build());
    bank.add_test_case(1, passing_case());

    let engine = BuiltinEngine::default();
    let mut env = RecordingEnvironment::default();
    let (all_passed, report) = BulkTester::new(&bank, &bank, &engine, &mut env)
        .run_all_tests_for_context(&context(), &mut NullSink)
        .unwrap();
    assert!(all_passed);
    assert_eq!(report.nogeneralfeedback.len(), 1);
    assert!(report.notests.is_empty());
}

#[test]
fn scope_skips_contexts_without_stack_questions() {
    let mut bank = bank();
    bank.add_context(Context {
        id: 2,
        name: "Course: Essays".to_string(),
        path: "/2".to_string(),
    });
    bank.add_category(stacktest::model::Category {
        id: 20,
        context: 2,
        name: "Writing".to_string(),
        path: "/2/20".to_string(),
    });
    bank.add_question(QuestionBuilder::new(1, "A").build());
    bank.add_question(QuestionBuilder::new(2, "B").build());
    bank.add_question(QuestionBuilder::new(3, "E").category(20).qtype("essay").build());

    let engine = BuiltinEngine::default();
    let mut env = RecordingEnvironment::default();
    let mut tester = BulkTester::new(&bank, &bank, &engine, &mut env);
    let scope = tester.enumerate_questions_by_context().unwrap();
    assert_eq!(scope.contexts.len(), 1);
    assert_eq!(scope.contexts[0].context.id, CONTEXT);
    assert_eq!(scope.total_questions(), 2);
    assert_eq!(scope.question_counts().get(&CONTEXT), Some(&2));

    let (_, report) = tester.run_all_contexts(&mut NullSink).unwrap();
    assert_eq!(report.notests.len(), 2);
}
