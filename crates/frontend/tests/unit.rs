use std::{sync::Arc, thread};

use ember_frontend::{CompilationUnit, FrontendConfig, FrontendError, MethodDecl, Op};
use ir::Type;

fn unit() -> CompilationUnit {
    let mut unit = CompilationUnit::new(FrontendConfig::default());
    unit.declare(
        MethodDecl::new("answer", Type::I32).with_code([Op::LdcI4(42), Op::Ret]),
    );
    unit.declare(MethodDecl::new("broken", Type::I32).with_code([Op::Ret]));
    unit
}

#[test]
fn bodies_are_analyzed_once() {
    let unit = unit();
    assert!(!unit.is_analyzed("answer"));

    let first = unit.body("answer").unwrap();
    assert!(unit.is_analyzed("answer"));
    let second = unit.body("answer").unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert!(first.validate().is_empty());
}

#[test]
fn errors_are_not_cached() {
    let unit = unit();
    for _ in 0..2 {
        assert_eq!(
            unit.body("broken").unwrap_err(),
            FrontendError::StackUnderflow { offset: 0 }
        );
    }
    assert!(!unit.is_analyzed("broken"));
}

#[test]
fn unknown_method() {
    assert_eq!(
        unit().body("missing").unwrap_err(),
        FrontendError::UnknownMethod("missing".to_string())
    );
}

#[test]
fn concurrent_requests_share_one_body() {
    let unit = unit();
    let bodies: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| scope.spawn(|| unit.body("answer").unwrap()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert!(bodies.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
}

#[test]
fn run_exclusively_returns_its_result() {
    let unit = unit();
    let names = unit.run_exclusively(|| {
        let mut names: Vec<_> = unit.method_names().cloned().collect();
        names.sort();
        names
    });
    assert_eq!(names, vec!["answer", "broken"]);
}

#[test]
#[should_panic(expected = "method `answer` is declared twice")]
fn duplicate_declaration() {
    let mut unit = unit();
    unit.declare(MethodDecl::new("answer", Type::Void).with_code([Op::Ret]));
}
