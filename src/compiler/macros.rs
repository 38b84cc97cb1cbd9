//! `syntax-rules` and `identifier-syntax` transformers
//!
//! Patterns bind their variables into index-addressed slots; a fresh slot
//! vector is used for every rule tried, so a failed match leaves nothing
//! behind. Expansion is not hygienic: identifiers introduced by a template are
//! resolved wherever the expansion lands.

use std::collections::HashMap;
use std::rc::Rc;

use crate::error::{Position, ScriptError};
use crate::reader::{Datum, DatumKind};

use super::keywords::{ELLIPSIS, IDENTIFIER_SYNTAX, SET_BANG, SYNTAX_RULES, UNDERSCORE};
use super::scope::{Binding, ScopeRef, Scopes};

#[derive(Debug)]
pub enum Transformer {
    SyntaxRules(Vec<Rule>),
    IdentifierSyntax { get: Template, set: Option<Rule> },
}

#[derive(Debug)]
pub struct Rule {
    pattern: RulePattern,
    template: Template,
    variable_count: usize,
}

#[derive(Debug)]
enum RulePattern {
    /// Matched against the whole form
    Form(Pattern),
    /// Matched against the form minus its keyword
    Arguments(ListPattern),
}

#[derive(Debug, Clone)]
enum Pattern {
    Constant(DatumKind),
    /// `None` for the wildcard `_`
    Variable(Option<usize>),
    BoundLiteral(Binding),
    UnboundLiteral(String),
    List(ListPattern),
    Vector(ListPattern),
}

/// `(pre ... repeat <ellipsis> post ... . rest)`
#[derive(Debug, Clone)]
struct ListPattern {
    pre: Vec<Pattern>,
    repeat: Option<Repeat>,
    post: Vec<Pattern>,
    rest: Option<Box<Pattern>>,
}

#[derive(Debug, Clone)]
struct Repeat {
    pattern: Box<Pattern>,
    group: Group,
}

/// The contiguous slots bound under one ellipsis
#[derive(Debug, Clone, Copy, PartialEq)]
struct Group {
    start: usize,
    count: usize,
}

#[derive(Debug)]
pub enum Template {
    Datum(Datum),
    Variable(usize),
    List { elements: Vec<Subtemplate>, tail: Option<Box<Template>> },
    Vector(Vec<Subtemplate>),
}

/// A list element followed by zero or more ellipses, one group per ellipsis
#[derive(Debug)]
pub struct Subtemplate {
    template: Template,
    groups: Vec<Group>,
}

#[derive(Debug, Clone)]
enum Match {
    Single(Datum),
    Sequence(Vec<Match>),
}

type Slots = Vec<Option<Match>>;

// Pattern variables by name, with the groups they repeat under, outermost first
#[derive(Default)]
struct Variables {
    names: HashMap<String, usize>,
    groups: Vec<Vec<Group>>,
}

impl Variables {
    fn len(&self) -> usize {
        self.groups.len()
    }

    fn get(&self, name: &str) -> Option<usize> {
        self.names.get(name).cloned()
    }
}

fn invalid<T>(message: &str, datum: &Datum) -> Result<T, ScriptError> {
    Err(ScriptError::compile(message, &datum.position))
}

// The elements of a list or improper list, and its tail
fn elements(datum: &Datum) -> Option<(&[Datum], Option<&Datum>)> {
    match datum.kind {
        DatumKind::List(ref items) => Some((items, None)),
        DatumKind::Pair { ref car, ref cdr } => Some((car, Some(cdr))),
        _ => None,
    }
}

fn empty_list(position: &Position) -> Datum {
    Datum::new(DatumKind::List(vec![]), position.clone())
}

/// Builds a transformer from the right-hand side of `define-syntax` and friends
pub fn create_transformer(spec: &Datum, scope: ScopeRef, scopes: &Scopes) -> Result<Rc<Transformer>, ScriptError> {
    if let Some(name) = spec.symbol() {
        return match scopes.resolve(scope, name) {
            Some(Binding::Macro(transformer)) => Ok(transformer),
            Some(_) => invalid("Not a macro transformer.", spec),
            None => invalid("Unresolved symbol.", spec),
        };
    }

    let items = match spec.list() {
        Some(items) => items,
        None => return invalid("Not a macro transformer.", spec),
    };
    check!(items.len() >= 2, ScriptError::compile("Invalid macro transformer.", &spec.position));

    match items[0].symbol() {
        Some(SYNTAX_RULES) => syntax_rules(spec, &items[1..], scope, scopes),
        Some(IDENTIFIER_SYNTAX) => identifier_syntax(spec, &items[1..], scope, scopes),
        _ => invalid("Invalid macro transformer.", spec),
    }
}

fn syntax_rules(spec: &Datum, items: &[Datum], scope: ScopeRef, scopes: &Scopes) -> Result<Rc<Transformer>, ScriptError> {
    let literal_names = match items[0].list() {
        Some(names) => names,
        None => return invalid("Invalid syntax rules.", spec),
    };

    let mut literals = HashMap::new();
    for literal in literal_names {
        let name = match literal.symbol() {
            Some(name) => name,
            None => return invalid("Invalid literals.", &items[0]),
        };
        let pattern = match scopes.resolve(scope, name) {
            Some(binding) => Pattern::BoundLiteral(binding),
            None => Pattern::UnboundLiteral(name.to_string()),
        };
        literals.insert(name.to_string(), pattern);
    }

    let mut rules = vec![];
    for rule in &items[1..] {
        let parts = match rule.list() {
            Some(parts) if parts.len() == 2 => parts,
            _ => return invalid("Invalid rule.", rule),
        };

        let mut variables = Variables::default();
        let pattern = match elements(&parts[0]) {
            Some((items, rest)) if !items.is_empty() => {
                RulePattern::Arguments(create_list_pattern(&parts[0], &items[1..], rest, &literals, &mut variables)?)
            }
            _ => RulePattern::Form(create_pattern(&parts[0], &literals, &mut variables)?),
        };
        let template = create_template(&parts[1], &variables, 0, false)?;
        rules.push(Rule {
            pattern,
            template,
            variable_count: variables.len(),
        });
    }

    Ok(Rc::new(Transformer::SyntaxRules(rules)))
}

fn identifier_syntax(
    spec: &Datum,
    items: &[Datum],
    _scope: ScopeRef,
    _scopes: &Scopes,
) -> Result<Rc<Transformer>, ScriptError> {
    let no_literals = HashMap::new();
    match items {
        [template] => Ok(Rc::new(Transformer::IdentifierSyntax {
            get: create_template(template, &Variables::default(), 0, false)?,
            set: None,
        })),
        [getter, setter] => {
            let get = match getter.list() {
                Some([id, template]) if id.symbol().is_some() => {
                    create_template(template, &Variables::default(), 0, false)?
                }
                _ => return invalid("Invalid macro transformer.", getter),
            };

            let (pattern, template) = match setter.list() {
                Some([pattern, template]) => (pattern, template),
                _ => return invalid("Invalid macro transformer.", setter),
            };
            let value = match pattern.list() {
                Some([set, id, value]) if set.is_symbol(SET_BANG) && id.symbol().is_some() => value,
                _ => return invalid("Invalid macro transformer.", pattern),
            };

            let mut variables = Variables::default();
            let value = create_pattern(value, &no_literals, &mut variables)?;
            let set = Rule {
                pattern: RulePattern::Arguments(ListPattern {
                    pre: vec![Pattern::Variable(None), value],
                    repeat: None,
                    post: vec![],
                    rest: None,
                }),
                template: create_template(template, &variables, 0, false)?,
                variable_count: variables.len(),
            };
            Ok(Rc::new(Transformer::IdentifierSyntax { get, set: Some(set) }))
        }
        _ => invalid("Invalid macro transformer.", spec),
    }
}

fn create_pattern(
    datum: &Datum,
    literals: &HashMap<String, Pattern>,
    variables: &mut Variables,
) -> Result<Pattern, ScriptError> {
    match datum.kind {
        DatumKind::Symbol(ref name) => {
            if let Some(literal) = literals.get(name) {
                return Ok(literal.clone());
            }
            match &name[..] {
                UNDERSCORE => Ok(Pattern::Variable(None)),
                ELLIPSIS => invalid("Invalid pattern.", datum),
                _ => {
                    check!(
                        variables.get(name).is_none(),
                        ScriptError::compile("Duplicate variable.", &datum.position)
                    );
                    let index = variables.len();
                    variables.names.insert(name.clone(), index);
                    variables.groups.push(vec![]);
                    Ok(Pattern::Variable(Some(index)))
                }
            }
        }
        DatumKind::List(ref items) => Ok(Pattern::List(create_list_pattern(datum, items, None, literals, variables)?)),
        DatumKind::Pair { ref car, ref cdr } => {
            Ok(Pattern::List(create_list_pattern(datum, car, Some(cdr), literals, variables)?))
        }
        DatumKind::Vector(ref items) => Ok(Pattern::Vector(create_list_pattern(datum, items, None, literals, variables)?)),
        ref kind => Ok(Pattern::Constant(kind.clone())),
    }
}

fn create_list_pattern(
    datum: &Datum,
    items: &[Datum],
    rest: Option<&Datum>,
    literals: &HashMap<String, Pattern>,
    variables: &mut Variables,
) -> Result<ListPattern, ScriptError> {
    let mut pattern = ListPattern {
        pre: vec![],
        repeat: None,
        post: vec![],
        rest: None,
    };

    let mut i = 0;
    while i < items.len() {
        let item = &items[i];
        let repeated = items.get(i + 1).map(|d| d.is_symbol(ELLIPSIS)).unwrap_or(false);
        if !repeated {
            let element = create_pattern(item, literals, variables)?;
            if pattern.repeat.is_some() {
                pattern.post.push(element);
            } else {
                pattern.pre.push(element);
            }
            i += 1;
            continue;
        }

        check!(pattern.repeat.is_none(), ScriptError::compile("Invalid pattern.", &datum.position));
        let start = variables.len();
        let element = create_pattern(item, literals, variables)?;
        let group = Group {
            start,
            count: variables.len() - start,
        };
        for groups in &mut variables.groups[start..] {
            groups.insert(0, group);
        }
        pattern.repeat = Some(Repeat {
            pattern: Box::new(element),
            group,
        });
        i += 2;
    }

    if let Some(rest) = rest {
        pattern.rest = Some(Box::new(create_pattern(rest, literals, variables)?));
    }
    Ok(pattern)
}

fn create_template(datum: &Datum, variables: &Variables, depth: usize, escaped: bool) -> Result<Template, ScriptError> {
    match datum.kind {
        DatumKind::Symbol(ref name) => match variables.get(name) {
            Some(index) => {
                check!(
                    depth >= variables.groups[index].len(),
                    ScriptError::compile("Invalid template.", &datum.position)
                );
                Ok(Template::Variable(index))
            }
            None if name == ELLIPSIS && !escaped => invalid("Invalid template.", datum),
            None => Ok(Template::Datum(datum.clone())),
        },
        DatumKind::List(ref items) => {
            // (... template) quotes the ellipsis inside template
            if !escaped && items.first().map(|d| d.is_symbol(ELLIPSIS)).unwrap_or(false) {
                check!(items.len() == 2, ScriptError::compile("Invalid template.", &datum.position));
                return create_template(&items[1], variables, depth, true);
            }
            Ok(Template::List {
                elements: create_subtemplates(datum, items, variables, depth, escaped)?,
                tail: None,
            })
        }
        DatumKind::Pair { ref car, ref cdr } => Ok(Template::List {
            elements: create_subtemplates(datum, car, variables, depth, escaped)?,
            tail: Some(Box::new(create_template(cdr, variables, depth, escaped)?)),
        }),
        DatumKind::Vector(ref items) => Ok(Template::Vector(create_subtemplates(
            datum, items, variables, depth, escaped,
        )?)),
        _ => Ok(Template::Datum(datum.clone())),
    }
}

fn create_subtemplates(
    datum: &Datum,
    items: &[Datum],
    variables: &Variables,
    depth: usize,
    escaped: bool,
) -> Result<Vec<Subtemplate>, ScriptError> {
    let mut subtemplates = vec![];
    let mut i = 0;
    while i < items.len() {
        let item = &items[i];
        check!(
            escaped || !item.is_symbol(ELLIPSIS),
            ScriptError::compile("Invalid template.", &datum.position)
        );
        let mut ellipses = 0;
        while !escaped && items.get(i + 1 + ellipses).map(|d| d.is_symbol(ELLIPSIS)).unwrap_or(false) {
            ellipses += 1;
        }

        let mut used = vec![];
        template_variables(item, variables, escaped, &mut used);
        let mut groups = vec![];
        for level in depth..depth + ellipses {
            // Driven by the first variable repeated that deep
            let group = used
                .iter()
                .filter_map(|&v| variables.groups[v].get(level))
                .next()
                .cloned();
            match group {
                Some(group) => groups.push(group),
                None => return invalid("Invalid template.", item),
            }
        }

        subtemplates.push(Subtemplate {
            template: create_template(item, variables, depth + ellipses, escaped)?,
            groups,
        });
        i += 1 + ellipses;
    }
    Ok(subtemplates)
}

// Pattern variables occurring in a template datum
fn template_variables(datum: &Datum, variables: &Variables, escaped: bool, out: &mut Vec<usize>) {
    match datum.kind {
        DatumKind::Symbol(ref name) => out.extend(variables.get(name)),
        DatumKind::List(ref items) | DatumKind::Vector(ref items) => {
            let escapes = !escaped && items.first().map(|d| d.is_symbol(ELLIPSIS)).unwrap_or(false);
            for item in items {
                template_variables(item, variables, escaped || escapes, out);
            }
        }
        DatumKind::Pair { ref car, ref cdr } => {
            for item in car {
                template_variables(item, variables, escaped, out);
            }
            template_variables(cdr, variables, escaped, out);
        }
        _ => {}
    }
}

struct MatchContext<'a> {
    scope: ScopeRef,
    scopes: &'a Scopes,
}

impl Pattern {
    fn matches(&self, form: &Datum, ctx: &MatchContext, slots: &mut Slots) -> bool {
        match *self {
            Pattern::Constant(ref kind) => form.kind == *kind,
            Pattern::Variable(None) => true,
            Pattern::Variable(Some(index)) => {
                slots[index] = Some(Match::Single(form.clone()));
                true
            }
            Pattern::BoundLiteral(ref binding) => match form.symbol() {
                Some(name) => ctx
                    .scopes
                    .resolve(ctx.scope, name)
                    .map(|b| b.same(binding))
                    .unwrap_or(false),
                None => false,
            },
            Pattern::UnboundLiteral(ref literal) => {
                form.is_symbol(literal) && ctx.scopes.resolve(ctx.scope, literal).is_none()
            }
            Pattern::List(ref pattern) => match elements(form) {
                Some((items, tail)) => pattern.matches(items, tail, &form.position, ctx, slots),
                None => false,
            },
            Pattern::Vector(ref pattern) => match form.kind {
                DatumKind::Vector(ref items) => pattern.matches(items, None, &form.position, ctx, slots),
                _ => false,
            },
        }
    }
}

impl ListPattern {
    fn matches(
        &self,
        items: &[Datum],
        tail: Option<&Datum>,
        position: &Position,
        ctx: &MatchContext,
        slots: &mut Slots,
    ) -> bool {
        let fixed = self.pre.len() + self.post.len();
        if items.len() < fixed {
            return false;
        }
        if self.rest.is_none() && tail.is_some() {
            return false;
        }

        let pre_matches = self
            .pre
            .iter()
            .zip(items)
            .all(|(pattern, item)| pattern.matches(item, ctx, slots));
        if !pre_matches {
            return false;
        }

        let repeat = match self.repeat {
            Some(ref repeat) => repeat,
            None => {
                let remaining = &items[self.pre.len()..];
                return match self.rest {
                    Some(ref rest) => {
                        let tail = tail.cloned().unwrap_or_else(|| empty_list(position));
                        let remainder = Datum::pair(remaining.to_vec(), tail, position.clone());
                        rest.matches(&remainder, ctx, slots)
                    }
                    None => remaining.is_empty(),
                };
            }
        };

        let middle_end = items.len() - self.post.len();
        let Group { start, count } = repeat.group;
        let mut sequences = vec![vec![]; count];
        for item in &items[self.pre.len()..middle_end] {
            if !repeat.pattern.matches(item, ctx, slots) {
                return false;
            }
            for (sequence, slot) in sequences.iter_mut().zip(&mut slots[start..start + count]) {
                if let Some(value) = slot.take() {
                    sequence.push(value);
                }
            }
        }
        for (sequence, slot) in sequences.into_iter().zip(&mut slots[start..start + count]) {
            *slot = Some(Match::Sequence(sequence));
        }

        let post_matches = self
            .post
            .iter()
            .zip(&items[middle_end..])
            .all(|(pattern, item)| pattern.matches(item, ctx, slots));
        if !post_matches {
            return false;
        }

        match self.rest {
            Some(ref rest) => {
                let tail = tail.cloned().unwrap_or_else(|| empty_list(position));
                rest.matches(&tail, ctx, slots)
            }
            None => true,
        }
    }
}

impl Rule {
    fn matches(&self, form: &Datum, ctx: &MatchContext) -> Option<Slots> {
        let mut slots = vec![None; self.variable_count];
        let matched = match self.pattern {
            RulePattern::Form(ref pattern) => pattern.matches(form, ctx, &mut slots),
            RulePattern::Arguments(ref pattern) => match elements(form) {
                Some((items, tail)) if !items.is_empty() => {
                    pattern.matches(&items[1..], tail, &form.position, ctx, &mut slots)
                }
                _ => false,
            },
        };
        if matched {
            Some(slots)
        } else {
            None
        }
    }

    fn expand(&self, form: &Datum, ctx: &MatchContext) -> Option<Result<Datum, ScriptError>> {
        self.matches(form, ctx)
            .map(|mut slots| self.template.generate(&mut slots, &form.position))
    }
}

impl Template {
    fn generate(&self, slots: &mut Slots, position: &Position) -> Result<Datum, ScriptError> {
        match *self {
            Template::Datum(ref datum) => Ok(datum.clone()),
            Template::Variable(index) => match slots.get(index) {
                Some(Some(Match::Single(datum))) => Ok(datum.clone()),
                _ => Err(ScriptError::compile("Invalid template.", position)),
            },
            Template::List { ref elements, ref tail } => {
                let mut items = vec![];
                for element in elements {
                    element.generate_into(slots, 0, position, &mut items)?;
                }
                match *tail {
                    Some(ref tail) => {
                        let tail = tail.generate(slots, position)?;
                        Ok(Datum::pair(items, tail, position.clone()))
                    }
                    None => Ok(Datum::new(DatumKind::List(items), position.clone())),
                }
            }
            Template::Vector(ref elements) => {
                let mut items = vec![];
                for element in elements {
                    element.generate_into(slots, 0, position, &mut items)?;
                }
                Ok(Datum::new(DatumKind::Vector(items), position.clone()))
            }
        }
    }
}

impl Subtemplate {
    fn generate_into(
        &self,
        slots: &mut Slots,
        level: usize,
        position: &Position,
        out: &mut Vec<Datum>,
    ) -> Result<(), ScriptError> {
        let Group { start, count } = match self.groups.get(level) {
            Some(&group) => group,
            None => {
                out.push(self.template.generate(slots, position)?);
                return Ok(());
            }
        };

        let saved: Slots = slots[start..start + count].to_vec();
        let length = match saved.first() {
            Some(Some(Match::Sequence(values))) => values.len(),
            _ => return Err(ScriptError::compile("Invalid template.", position)),
        };

        for n in 0..length {
            for (slot, value) in slots[start..start + count].iter_mut().zip(&saved) {
                *slot = match *value {
                    Some(Match::Sequence(ref values)) => values.get(n).cloned(),
                    ref other => other.clone(),
                };
            }
            self.generate_into(slots, level + 1, position, out)?;
        }

        slots[start..start + count].clone_from_slice(&saved);
        Ok(())
    }
}

impl Transformer {
    /// Expands a use of the macro, either `(keyword ...)` or a bare keyword
    pub fn transform(&self, form: &Datum, scope: ScopeRef, scopes: &Scopes) -> Result<Datum, ScriptError> {
        let ctx = MatchContext { scope, scopes };
        match *self {
            Transformer::SyntaxRules(ref rules) => {
                for rule in rules {
                    if let Some(expansion) = rule.expand(form, &ctx) {
                        return expansion;
                    }
                }
                invalid("No matching syntax rule.", form)
            }
            Transformer::IdentifierSyntax { ref get, .. } => {
                let expansion = get.generate(&mut vec![], &form.position)?;
                match elements(form) {
                    Some((items, tail)) if !items.is_empty() => {
                        let mut items = items.to_vec();
                        items[0] = expansion;
                        match tail {
                            Some(tail) => Ok(Datum::pair(items, tail.clone(), form.position.clone())),
                            None => Ok(Datum::new(DatumKind::List(items), form.position.clone())),
                        }
                    }
                    _ => Ok(expansion),
                }
            }
        }
    }

    /// Expands `(set! keyword value)`
    pub fn transform_set(&self, form: &Datum, scope: ScopeRef, scopes: &Scopes) -> Result<Datum, ScriptError> {
        let ctx = MatchContext { scope, scopes };
        match *self {
            Transformer::IdentifierSyntax { set: Some(ref rule), .. } => match rule.expand(form, &ctx) {
                Some(expansion) => expansion,
                None => invalid("No matching syntax rule.", form),
            },
            _ => invalid("Not a variable.", form),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::compiler::scope::{GLOBAL_SCOPE, TOP_LEVEL_SCOPE};
    use crate::reader::read;
    use crate::vm::{Heap, Invocation, Object};

    fn datum(text: &str) -> Datum {
        read(text, None).unwrap().remove(0)
    }

    fn scopes() -> Scopes {
        let mut heap = Heap::new();
        let mut invocation = || {
            heap.alloc(Object::Invocation(Invocation {
                procedure: None,
                slots: vec![],
            }))
        };
        let global = invocation();
        let top = invocation();
        let mut scopes = Scopes::new(global, top);
        scopes.add_literal(GLOBAL_SCOPE, "else");
        scopes
    }

    fn expand(spec: &str, form: &str) -> Result<String, ScriptError> {
        let scopes = scopes();
        let transformer = create_transformer(&datum(spec), TOP_LEVEL_SCOPE, &scopes)?;
        transformer
            .transform(&datum(form), TOP_LEVEL_SCOPE, &scopes)
            .map(|d| d.to_string())
    }

    #[test]
    fn first_matching_rule_wins() {
        let spec = "(syntax-rules () ((_) 0) ((_ x) (f x)) ((_ x y) (g x y)))";
        assert_eq!(expand(spec, "(m)").unwrap(), "0");
        assert_eq!(expand(spec, "(m 1)").unwrap(), "(f 1)");
        assert_eq!(expand(spec, "(m 1 2)").unwrap(), "(g 1 2)");
        assert_eq!(expand(spec, "(m 1 2 3)").unwrap_err().message(), "No matching syntax rule.");
    }

    #[test]
    fn ellipsis_zero_or_more() {
        let spec = "(syntax-rules () ((_ (a b) ...) (list (cons a b) ...)))";
        assert_eq!(expand(spec, "(m)").unwrap(), "(list)");
        assert_eq!(expand(spec, "(m (1 2) (3 4))").unwrap(), "(list (cons 1 2) (cons 3 4))");
    }

    #[test]
    fn repeated_pairs() {
        let spec = "(syntax-rules () ((_ (a a2) ...) (quote ((a a2) ...))))";
        assert_eq!(expand(spec, "(m (1 2) (3 4))").unwrap(), "(quote ((1 2) (3 4)))");
    }

    #[test]
    fn nested_ellipses() {
        let spec = "(syntax-rules () ((_ (k v ...) ...) (quote ((v ... k) ...))))";
        assert_eq!(expand(spec, "(m (a 1 2) (b))").unwrap(), "(quote ((1 2 a) (b)))");
    }

    #[test]
    fn post_ellipsis_and_rest() {
        let spec = "(syntax-rules () ((_ a ... z) (z a ...)))";
        assert_eq!(expand(spec, "(m 1 2 3)").unwrap(), "(3 1 2)");
        let spec = "(syntax-rules () ((_ a . rest) (quote rest)))";
        assert_eq!(expand(spec, "(m 1 2 3)").unwrap(), "(quote (2 3))");
        assert_eq!(expand(spec, "(m 1)").unwrap(), "(quote ())");
    }

    #[test]
    fn literals() {
        let spec = "(syntax-rules (else to) ((_ else) 1) ((_ to) 2) ((_ x) 3))";
        assert_eq!(expand(spec, "(m else)").unwrap(), "1");
        assert_eq!(expand(spec, "(m to)").unwrap(), "2");
        assert_eq!(expand(spec, "(m other)").unwrap(), "3");
    }

    #[test]
    fn vectors_and_constants() {
        let spec = "(syntax-rules () ((_ #(a ...) \"s\") (b a ...)))";
        assert_eq!(expand(spec, "(m #(1 2) \"s\")").unwrap(), "(b 1 2)");
        assert!(expand(spec, "(m #(1 2) \"t\")").is_err());
    }

    #[test]
    fn escaped_ellipsis() {
        let spec = "(syntax-rules () ((_ a) (quote (a (... ...)))))";
        assert_eq!(expand(spec, "(m 1)").unwrap(), "(quote (1 ...))");
    }

    #[test]
    fn invalid_definitions() {
        let scopes = scopes();
        let create = |spec| create_transformer(&datum(spec), TOP_LEVEL_SCOPE, &scopes).map(|_| ());
        assert_eq!(
            create("(syntax-rules () ((_ a a) a))").unwrap_err().message(),
            "Duplicate variable."
        );
        assert_eq!(
            create("(syntax-rules () ((_ a ...) a))").unwrap_err().message(),
            "Invalid template."
        );
        assert_eq!(create("(syntax-rules () ((_ a ... b ...) a))").unwrap_err().message(), "Invalid pattern.");
        assert_eq!(create("(syntax-rules (1) ((_) 1))").unwrap_err().message(), "Invalid literals.");
        assert_eq!(create("(foo)").unwrap_err().message(), "Invalid macro transformer.");
        assert_eq!(create("nothing").unwrap_err().message(), "Unresolved symbol.");
    }

    #[test]
    fn identifier_syntax() {
        let scopes = scopes();
        let spec = datum("(identifier-syntax (_ (car p)) ((set! _ v) (set-car! p v)))");
        let transformer = create_transformer(&spec, TOP_LEVEL_SCOPE, &scopes).unwrap();
        let expand = |form| transformer.transform(&datum(form), TOP_LEVEL_SCOPE, &scopes).unwrap().to_string();
        assert_eq!(expand("x"), "(car p)");
        assert_eq!(expand("(x 1)"), "((car p) 1)");
        let set = transformer
            .transform_set(&datum("(set! x 5)"), TOP_LEVEL_SCOPE, &scopes)
            .unwrap();
        assert_eq!(set.to_string(), "(set-car! p 5)");
    }
}
