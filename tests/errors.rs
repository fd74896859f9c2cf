use bergskript::analyzer::AnalysisError;
use bergskript::expr::RuntimeError;
use bergskript::interpreter::{InterpretErr, Interpreter};
use bergskript::parser::{parse, ParseError};
use bergskript::scanner::{scan, LexError};
use bergskript::value::SharedBuffer;

fn run(code: &str) -> InterpretErr {
    Interpreter::with_output(SharedBuffer::default())
        .run(code)
        .unwrap_err()
}

#[test]
fn declaration_without_type_or_value() {
    let err = run("
DEF main(): Integer DO
    LET x;
    RETURN 0;
END
");

    match err {
        InterpretErr::Analysis(AnalysisError::MissingTypeOrValue { name, .. }) => {
            assert_eq!(&*name, "x")
        }
        x => panic!("{x:?} should not be reported here."),
    }
}

#[test]
fn for_over_non_iterable() {
    let err = run("
DEF main(): Integer DO
    FOR i IN \"abc\" DO
        print(i);
    END
    RETURN 0;
END
");

    match err {
        InterpretErr::Analysis(AnalysisError::TypeMismatch { expected, found, .. }) => {
            assert_eq!(expected, "IntegerIterable");
            assert_eq!(found, "String");
        }
        x => panic!("{x:?} should not be reported here."),
    }
}

#[test]
fn decimal_division_by_zero() {
    // Never analyzed: mixing Integer and Decimal would be rejected before running.
    let tokens = scan("DEF main(): Integer DO RETURN 1 / 0.0; END").unwrap();
    let source = parse(&tokens).unwrap();
    let res = Interpreter::with_output(SharedBuffer::default()).interpret(&source);

    assert_eq!(res, Err(RuntimeError::DivisionByZero));
}

#[test]
fn analyzed_division_by_zero() {
    let err = run("
LET zero: Decimal = 0.00;

DEF main(): Integer DO
    print(1.0 / zero);
    RETURN 0;
END
");

    assert!(matches!(
        err,
        InterpretErr::Runtime(RuntimeError::DivisionByZero)
    ));
}

#[test]
fn no_main() {
    let programs = [
        "",
        "LET x: Integer = 1;",
        "DEF main() DO END",
        "DEF main(x: Integer): Integer DO RETURN x; END",
        "DEF helper(): Integer DO RETURN \"not even valid\"; END",
    ];
    for program in programs {
        let err = run(program);
        assert!(
            matches!(err, InterpretErr::Analysis(AnalysisError::MissingMain)),
            "{program}: {err:?}"
        );
    }
}

#[test]
fn undefined_names() {
    let err = run("DEF main(): Integer DO RETURN y; END");
    assert!(matches!(
        err,
        InterpretErr::Analysis(AnalysisError::UndefinedVariable { .. })
    ));

    let err = run("DEF main(): Integer DO RETURN twice(2); END");
    assert!(matches!(
        err,
        InterpretErr::Analysis(AnalysisError::UndefinedFunction { arity: 1, .. })
    ));
}

#[test]
fn method_locals_do_not_leak() {
    let err = run("
DEF setup() DO
    LET secret = 1;
END

DEF main(): Integer DO
    setup();
    RETURN secret;
END
");

    assert!(matches!(
        err,
        InterpretErr::Analysis(AnalysisError::UndefinedVariable { .. })
    ));
}

#[test]
fn literal_out_of_range() {
    let err = run("DEF main(): Integer DO RETURN 3000000000; END");
    assert!(matches!(
        err,
        InterpretErr::Analysis(AnalysisError::IntegerOutOfRange { .. })
    ));
}

#[test]
fn lex_errors_carry_offsets() {
    assert_eq!(
        scan("LET x = 1 @ 2;"),
        Err(LexError::UnexpectedCharacter { ch: '@', offset: 10 })
    );
    assert_eq!(
        scan("LET s = \"open"),
        Err(LexError::UnterminatedString { offset: 8 })
    );
    assert!(matches!(run("LET c = 'ab';"), InterpretErr::Lex(_)));
}

#[test]
fn parse_errors_carry_offsets() {
    let err = run("DEF main(): Integer DO RETURN 1 END");
    match err {
        InterpretErr::Parse(err) => assert_eq!(err.offset(), 32),
        x => panic!("{x:?} should not be reported here."),
    }

    let tokens = scan("DEF main(): Integer DO RETURN f(1,); END").unwrap();
    assert_eq!(
        parse(&tokens),
        Err(ParseError::TrailingComma { offset: 33 })
    );
}

#[test]
fn messages_name_the_problem() {
    let err = run("DEF main(): Integer DO LET x: Integer = 1.5; RETURN x; END");
    let msg = err.to_string();
    assert!(msg.contains("Integer"), "{msg}");
    assert!(msg.contains("Decimal"), "{msg}");
}
