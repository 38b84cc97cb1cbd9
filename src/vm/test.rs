use super::*;
use crate::compiler::{Binding, Compiler, Scopes, GLOBAL_SCOPE, TOP_LEVEL_SCOPE};
use crate::error::ErrorKind;
use crate::reader::read;

// A machine with the standard procedures, without the derived syntax
struct Machine {
    vm: Vm,
    scopes: Scopes,
}

impl Machine {
    fn new(max_stack_depth: usize) -> Machine {
        let mut vm = Vm::new(max_stack_depth);
        let mut scopes = Scopes::new(vm.global(), vm.top_level());
        for name in stdlib::names() {
            scopes.add_variable(GLOBAL_SCOPE, name, None, stdlib::procedure(name), vm.heap_mut());
        }
        Machine { vm, scopes }
    }

    fn load(&mut self, text: &str) {
        if let Err(e) = self.run(text) {
            panic!("{} failed: {}", text, e);
        }
    }

    fn append(&mut self, text: &str) {
        let datum = read(text, None).unwrap().remove(0);
        let code = Compiler::new(&mut self.scopes, self.vm.heap_mut())
            .compile_top_level(&datum, TOP_LEVEL_SCOPE)
            .unwrap();
        self.vm
            .append_top_level(self.scopes.constants(TOP_LEVEL_SCOPE), code)
            .unwrap();
    }

    fn run(&mut self, text: &str) -> Result<Option<Value>, ScriptError> {
        let mut result = Ok(None);
        for datum in read(text, None).unwrap() {
            let code = Compiler::new(&mut self.scopes, self.vm.heap_mut()).compile_top_level(&datum, TOP_LEVEL_SCOPE)?;
            self.vm
                .append_top_level(self.scopes.constants(TOP_LEVEL_SCOPE), code)
                .unwrap();
            result = self.vm.execute(0);
            if result.is_err() {
                break;
            }
        }
        result
    }

    fn eval(&mut self, text: &str) -> String {
        match self.run(text) {
            Ok(Some(value)) => value.to_repl(self.vm.heap()),
            Ok(None) => panic!("{} did not finish", text),
            Err(e) => panic!("{} failed: {}", text, e),
        }
    }

    fn global(&self, name: &str) -> Value {
        match self.scopes.resolve(TOP_LEVEL_SCOPE, name) {
            Some(Binding::Variable(variable)) => self
                .vm
                .heap()
                .invocation(self.vm.top_level())
                .unwrap()
                .slots[variable.index]
                .clone(),
            other => panic!("{} is bound to {:?}", name, other),
        }
    }
}

#[test]
fn tail_calls_run_in_constant_depth() {
    let mut machine = Machine::new(64);
    assert_eq!(
        machine.eval("(define (loop n acc) (if (= n 0) acc (loop (- n 1) (+ acc 1)))) (loop 100000 0)"),
        "100000"
    );
}

#[test]
fn deep_recursion_overflows() {
    let mut machine = Machine::new(64);
    let error = machine
        .run("(define (count n) (if (= n 0) 0 (+ 1 (count (- n 1))))) (count 1000)")
        .unwrap_err();
    assert_eq!(error.message(), "Stack overflow.");
    assert_eq!(machine.eval("(count 10)"), "10");
}

#[test]
fn runtime_errors_carry_a_frame_per_call() {
    let mut machine = Machine::new(1000);
    let error = machine
        .run("(define (f x) (car x))\n(define (g x) (+ 1 (f x)))\n(g 1)")
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Runtime);
    assert_eq!(error.message(), "Invalid argument.");
    assert_eq!(error.position().line(), 0);
    let lines: Vec<usize> = error.backtrace().iter().map(Position::line).collect();
    assert_eq!(lines, vec![1, 2]);
}

#[test]
fn continuations_resume_more_than_once() {
    let mut machine = Machine::new(1000);
    assert_eq!(machine.eval("(+ 1 (call/cc (lambda (k) (k 10) 20)))"), "11");

    machine.load("(define saved #f)");
    assert_eq!(
        machine.eval("(+ 100 (call/cc (lambda (k) (set! saved k) 1)))"),
        "101"
    );
    assert_eq!(machine.eval("(saved 5)"), "105");
    assert_eq!(machine.eval("(saved 7)"), "107");
}

#[test]
fn continuations_take_exactly_one_value() {
    let mut machine = Machine::new(1000);
    assert_eq!(machine.run("(call/cc)").unwrap_err().message(), "Requires exactly one argument.");
    assert_eq!(
        machine.run("(call/cc car cdr)").unwrap_err().message(),
        "Requires exactly one argument."
    );
    let error = machine.run("(+ 1 (call/cc (lambda (k) (k 1 2))))").unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Runtime);
    assert_eq!(error.message(), "Requires exactly one argument.");
    assert_eq!(machine.eval("(+ 1 (call/cc (lambda (k) (k 1))))"), "2");
}

#[test]
fn apply_spreads_its_last_argument() {
    let mut machine = Machine::new(1000);
    assert_eq!(machine.eval("(apply + 1 2 '(3 4))"), "10");
    assert_eq!(machine.eval("(apply list '())"), "()");
    assert_eq!(machine.run("(apply + 1 2)").unwrap_err().message(), "Invalid argument.");
}

#[test]
fn cycles_are_collected() {
    let mut machine = Machine::new(1000);
    machine.load("(define node (list 1)) (set-cdr! node node)");
    let id = machine.global("node").heap_id().unwrap();

    machine.vm.collect();
    assert!(machine.vm.heap().is_live(id));

    machine.load("(set! node #f)");
    assert_eq!(machine.run("1").unwrap(), Some(Value::Integer(1)));
    assert!(machine.vm.heap().is_live(id));
    let stats = machine.vm.collect();
    assert!(stats.freed > 0);
    assert!(!machine.vm.heap().is_live(id));
}

#[test]
fn closures_survive_collection() {
    let mut machine = Machine::new(1000);
    machine.load("(define (counter) (define n 0) (lambda () (set! n (+ n 1)) n)) (define next (counter))");
    machine.vm.collect();
    machine.eval("(next)");
    machine.vm.collect();
    assert_eq!(machine.eval("(next)"), "2");
}

#[test]
fn cycle_budget_pauses_execution() {
    let mut machine = Machine::new(1000);
    machine.load("(define (loop n) (if (= n 0) 'done (loop (- n 1))))");
    machine.append("(loop 1000)");

    let mut rounds = 0;
    let result = loop {
        rounds += 1;
        if let Some(value) = machine.vm.execute(100).unwrap() {
            break value;
        }
    };
    assert!(rounds > 1);
    assert_eq!(result, Value::symbol("done"));
}

#[test]
fn suspended_natives_resume_with_a_value() {
    let mut machine = Machine::new(1000);
    let later: NativeFunction = Rc::new(|_: &mut Heap, _: &[Value]| Ok(None));
    let pending = Value::Native(NativeProcedure::new("later", (0, false), later));
    machine
        .scopes
        .add_variable(GLOBAL_SCOPE, "later", None, Some(pending), machine.vm.heap_mut());

    assert_eq!(machine.run("(+ 1 (later))").unwrap(), None);
    assert!(machine.vm.is_suspended());
    assert_eq!(machine.vm.execute(0).unwrap(), None);
    assert!(machine.vm.wake_up(Value::Integer(41)));
    assert_eq!(machine.vm.execute(0).unwrap(), Some(Value::Integer(42)));
    assert!(!machine.vm.wake_up(Value::Integer(0)));
}

#[test]
fn calling_a_non_procedure_fails() {
    let mut machine = Machine::new(1000);
    assert_eq!(machine.run("(1 2)").unwrap_err().message(), "Not a procedure.");
    assert_eq!(
        machine.run("((lambda (x) x))").unwrap_err().message(),
        "Requires exactly one argument."
    );
    assert_eq!(
        machine.run("((lambda (x y . z) x) 1)").unwrap_err().message(),
        "Requires at least 2 arguments."
    );
}

#[test]
fn profiler_sees_every_instruction() {
    let mut machine = Machine::new(1000);
    machine.append("(+ 1 2)");

    let mut profiler = TimeProfiler::default();
    let value = machine.vm.execute_with_profiler(0, &mut profiler).unwrap();
    assert_eq!(value, Some(Value::Integer(3)));
    let report = profiler.report().unwrap();
    assert!(report.contains("Call"));
}
