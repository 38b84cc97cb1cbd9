use std::rc::Rc;

use super::*;
use crate::reader::read;
use crate::vm::{Invocation, Object};

struct Fixture {
    heap: Heap,
    scopes: Scopes,
}

impl Fixture {
    fn new() -> Fixture {
        let mut heap = Heap::new();
        let global = heap.alloc(Object::Invocation(Invocation {
            procedure: None,
            slots: vec![],
        }));
        let top = heap.alloc(Object::Invocation(Invocation {
            procedure: None,
            slots: vec![],
        }));
        let mut scopes = Scopes::new(global, top);
        for name in AUXILIARY.iter() {
            scopes.add_literal(GLOBAL_SCOPE, name);
        }
        Fixture { heap, scopes }
    }

    fn compile(&mut self, text: &str) -> Result<Bytecode, ScriptError> {
        let mut code = Bytecode::new();
        for datum in read(text, None).unwrap() {
            let mut compiler = Compiler::new(&mut self.scopes, &mut self.heap);
            code = compiler.compile_top_level(&datum, TOP_LEVEL_SCOPE)?;
        }
        Ok(code)
    }

    fn last_lambda(&self) -> Rc<Lambda> {
        match self.scopes.constants(TOP_LEVEL_SCOPE).iter().rev().find_map(|c| match *c {
            Constant::Lambda(ref lambda) => Some(lambda.clone()),
            _ => None,
        }) {
            Some(lambda) => lambda,
            None => panic!("no lambda compiled"),
        }
    }
}

macro_rules! compile_error {
    ($text:expr) => {{
        let mut fixture = Fixture::new();
        fixture.compile($text).unwrap_err().message().to_string()
    }};
}

#[test]
fn conditional_layout() {
    let mut fixture = Fixture::new();
    let code = fixture.compile("(if #t 1 2)").unwrap();
    assert_eq!(
        code.disassemble(),
        "0000 Constant 0\n\
         0005 ConditionalJump 10\n\
         0010 Constant 1\n\
         0015 Jump 5\n\
         0020 Constant 2\n\
         0025 Exit\n"
    );
}

#[test]
fn definitions_push_nothing() {
    let mut fixture = Fixture::new();
    let code = fixture.compile("(define x)").unwrap();
    assert_eq!(code.disassemble(), "0000 LambdaExit\n");

    let code = fixture.compile("(define y 1)").unwrap();
    assert_eq!(code.disassemble(), "0000 Constant 0\n0005 SetVariable 0 1\n0014 LambdaExit\n");
    assert!(fixture.scopes.resolve(TOP_LEVEL_SCOPE, "y").is_some());
}

#[test]
fn procedure_definitions() {
    let mut fixture = Fixture::new();
    fixture.compile("(define (loop n . rest) (loop n))").unwrap();
    let lambda = fixture.last_lambda();
    assert_eq!(lambda.name.as_ref().map(|n| &n[..]), Some("loop"));
    assert_eq!(lambda.argument_count, 1);
    assert!(lambda.rest);
    assert_eq!(lambda.slot_count, 2);

    let listing = lambda.body.disassemble();
    assert!(listing.contains("TailCall"));
    assert!(listing.ends_with("Return\n"));
}

#[test]
fn only_the_last_form_is_in_tail_position() {
    let mut fixture = Fixture::new();
    fixture.compile("(define (f g) (g) (g))").unwrap();
    let listing = fixture.last_lambda().body.disassemble();
    assert_eq!(listing.matches("TailCall").count(), 1);
    assert_eq!(listing.matches(" Call").count(), 1);
    assert_eq!(listing.matches("Pop").count(), 1);
}

#[test]
fn internal_definitions() {
    let mut fixture = Fixture::new();
    fixture
        .compile("(define (f) (define a 1) (define (g) a) (g))")
        .unwrap();
    assert_eq!(fixture.last_lambda().slot_count, 2);
}

#[test]
fn syntax_scopes_end_with_their_body() {
    let mut fixture = Fixture::new();
    assert!(fixture.compile("(let-syntax ((m (syntax-rules () ((_) 1)))) (m))").is_ok());
    assert_eq!(fixture.compile("(m)").unwrap_err().message(), "Unresolved symbol.");
}

#[test]
fn quasiquote_builds_lists_at_runtime() {
    let mut fixture = Fixture::new();
    fixture.compile("(define x 1)").unwrap();
    let listing = fixture.compile("`(1 ,x ,@x)").unwrap().disassemble();
    assert!(listing.contains("Call"));

    let listing = fixture.compile("`(1 x)").unwrap().disassemble();
    assert_eq!(listing.lines().count(), 2);
}

#[test]
fn compile_errors() {
    assert_eq!(compile_error!("(define)"), "Invalid definition.");
    assert_eq!(compile_error!("(define 1 2)"), "Invalid definition.");
    assert_eq!(compile_error!("(lambda (x))"), "Function has no body.");
    assert_eq!(compile_error!("(lambda (x) (define y 1))"), "Function has no body.");
    assert_eq!(compile_error!("(lambda (x 1) x)"), "Invalid argument.");
    assert_eq!(compile_error!("(define x 1) (if x (define y 1))"), "Definitions not allowed here.");
    assert_eq!(compile_error!("(lambda () 1 (define y 2) y)"), "Definitions not allowed here.");
    assert_eq!(compile_error!("y"), "Unresolved symbol.");
    assert_eq!(compile_error!("(set! y 1)"), "Unresolved symbol.");
    assert_eq!(compile_error!("(set! 1 1)"), "Not a variable.");
    assert_eq!(compile_error!("()"), "Invalid expression.");
    assert_eq!(compile_error!("(if)"), "Invalid expression.");
    assert_eq!(compile_error!("else"), "Invalid expression.");
    assert_eq!(compile_error!("`,@x"), "Invalid expression.");
}

#[test]
fn errors_carry_positions() {
    let mut fixture = Fixture::new();
    let error = fixture.compile("(define x 1)\n  (f x)").unwrap_err();
    assert_eq!(error.position().line(), 1);
    assert_eq!(error.position().column(), 3);
}

#[test]
fn deep_nesting_is_rejected() {
    let text = format!("{}1{}", "(".repeat(MAX_DEPTH + 10), ")".repeat(MAX_DEPTH + 10));
    assert_eq!(compile_error!(&text), "Expression too deeply nested.");
}
