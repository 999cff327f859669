use ember_frontend::{analyze, FrontendConfig, FrontendError, MethodDecl, Op};
use ir::Type;

fn analyze_code(return_type: Type, code: impl IntoIterator<Item = Op>) -> FrontendError {
    let decl = MethodDecl::new("f", return_type)
        .with_parameters([Type::I32])
        .with_code(code);
    analyze(&decl, &FrontendConfig::default()).unwrap_err()
}

#[test]
fn stack_underflow() {
    assert_eq!(
        analyze_code(Type::Void, [Op::Pop, Op::Ret]),
        FrontendError::StackUnderflow { offset: 0 }
    );
    assert_eq!(
        analyze_code(Type::I32, [Op::LdArg(0), Op::Add, Op::Ret]),
        FrontendError::StackUnderflow { offset: 1 }
    );
}

#[test]
fn branch_target_out_of_range() {
    assert_eq!(
        analyze_code(Type::Void, [Op::Nop, Op::Br(7)]),
        FrontendError::BranchTargetOutOfRange { offset: 1, target: 7 }
    );
    assert_eq!(
        analyze_code(Type::Void, [Op::LdArg(0), Op::Switch(vec![2, 3]), Op::Ret]),
        FrontendError::BranchTargetOutOfRange { offset: 1, target: 3 }
    );
}

#[test]
fn index_out_of_range() {
    assert_eq!(
        analyze_code(Type::I32, [Op::LdArg(1), Op::Ret]),
        FrontendError::ArgumentOutOfRange { offset: 0, index: 1 }
    );
    assert_eq!(
        analyze_code(Type::Void, [Op::LdArg(0), Op::StLoc(0), Op::Ret]),
        FrontendError::LocalOutOfRange { offset: 1, index: 0 }
    );
}

#[test]
fn falls_off_the_end() {
    assert_eq!(
        analyze_code(Type::Void, []),
        FrontendError::FallsOffEnd { offset: 0 }
    );
    assert_eq!(
        analyze_code(Type::Void, [Op::Nop, Op::Nop]),
        FrontendError::FallsOffEnd { offset: 1 }
    );
    assert_eq!(
        analyze_code(Type::Void, [Op::LdArg(0), Op::LdcI4(0), Op::Ceq, Op::BrTrue(0)]),
        FrontendError::FallsOffEnd { offset: 3 }
    );
}

#[test]
fn type_mismatch() {
    let err = analyze_code(Type::I32, [Op::LdcBool(true), Op::Ret]);
    assert_eq!(
        err,
        FrontendError::TypeMismatch {
            offset: 1,
            expected: "i32".to_string(),
            found: "bool".to_string(),
        }
    );
    assert_eq!(
        err.to_string(),
        "instruction 1: expected a value of type `i32`, found `bool`"
    );

    // Branch conditions must be booleans.
    assert!(matches!(
        analyze_code(Type::Void, [Op::LdArg(0), Op::BrTrue(0), Op::Ret]),
        FrontendError::TypeMismatch { offset: 1, .. }
    ));
}

#[test]
fn messages() {
    assert_eq!(
        FrontendError::StackUnderflow { offset: 4 }.to_string(),
        "instruction 4: stack underflow"
    );
    assert_eq!(
        FrontendError::BranchTargetOutOfRange { offset: 0, target: 9 }.to_string(),
        "instruction 0: branch target 9 is out of range"
    );
}
