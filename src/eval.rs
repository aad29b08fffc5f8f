use std::path::Path;

use tracing::{debug, trace};

use crate::config::Config;
use crate::error::{LispError, LispResult};
use crate::gc::{Collector, GcStats};
use crate::heap::{Heap, SweepOutcome};
use crate::primitives::{self, Native, NativeFn, NativeKind};
use crate::printer;
use crate::reader;
use crate::roots::RootSet;
use crate::symbol::SymbolTable;
use crate::value::{Kind, NativeId, Value, ValueRef};

/// Remaining native stack below which nested evaluation moves to a fresh segment.
pub(crate) const STACK_RED_ZONE: usize = 128 * 1024;
/// Size of each extra stack segment.
pub(crate) const STACK_GROW_SIZE: usize = 4 * 1024 * 1024;

/// Symbols the evaluator recognizes by identity. Each is bound to itself
/// while the runtime initializes.
#[derive(Clone, Copy)]
pub struct Markers {
    pub lambda: ValueRef,
    pub macro_: ValueRef,
    pub def: ValueRef,
    pub quote: ValueRef,
    pub unquote: ValueRef,
    pub quasiquote: ValueRef,
    pub partial: ValueRef,
    pub pragma: ValueRef,
}

impl Markers {
    fn unset() -> Self {
        let nil = ValueRef::NIL;
        Markers {
            lambda: nil,
            macro_: nil,
            def: nil,
            quote: nil,
            unquote: nil,
            quasiquote: nil,
            partial: nil,
            pragma: nil,
        }
    }
}

/// The runtime context: arena, symbol table, root stack and builtin registry.
pub struct Machine {
    pub heap: Heap,
    pub symbols: SymbolTable,
    pub roots: RootSet,
    collector: Collector,
    natives: Vec<Native>,
    markers: Markers,
    config: Config,

    /// Set while markers and builtins are installed; relaxes write-once.
    initializing: bool,
    /// Current nesting of `evaluate`.
    depth: usize,
    /// Log every evaluation step.
    pub trace: bool,
}

impl Machine {
    pub fn new(config: Config) -> LispResult<Self> {
        config.validate()?;

        let mut m = Machine {
            heap: Heap::new(config.arena_capacity),
            symbols: SymbolTable::new(config.max_symbols, config.max_symbol_len),
            roots: RootSet::new(),
            collector: Collector::new(config.max_usage_percent),
            natives: Vec::with_capacity(config.max_natives),
            markers: Markers::unset(),
            trace: config.trace,
            config,
            initializing: true,
            depth: 0,
        };

        m.install_markers()?;
        primitives::register_builtins(&mut m)?;
        m.heap.seal_permanent();
        m.initializing = false;

        debug!(
            target: "slisp::init",
            permanent_slots = m.heap.permanent_len(),
            symbols = m.symbols.count(),
            natives = m.natives.len(),
            "runtime initialized"
        );
        Ok(m)
    }

    /// Intern the special-form markers and bind each to itself.
    fn install_markers(&mut self) -> LispResult<()> {
        let lambda = self.self_bound(".\\")?;
        let def = self.self_bound("def")?;
        let macro_ = self.self_bound("m\\")?;
        let quote = self.self_bound("quote")?;
        let unquote = self.self_bound("unquote")?;
        let quasiquote = self.self_bound("quasiquote")?;
        let partial = self.self_bound("..")?;
        let pragma = self.self_bound("pragma")?;
        self.markers = Markers {
            lambda,
            macro_,
            def,
            quote,
            unquote,
            quasiquote,
            partial,
            pragma,
        };
        Ok(())
    }

    fn self_bound(&mut self, name: &str) -> LispResult<ValueRef> {
        let sym = self.intern(name)?;
        self.bind(sym, sym)?;
        Ok(sym)
    }

    /// Install a native under `name`. Only valid during initialization.
    pub(crate) fn register_native(
        &mut self,
        name: &'static str,
        kind: NativeKind,
        func: NativeFn,
    ) -> LispResult<()> {
        if !self.initializing {
            return Err(LispError::Unreachable(format!(
                "native `{}` registered after initialization",
                name
            )));
        }
        if self.natives.len() >= self.config.max_natives {
            return Err(LispError::TooManyNatives { max: self.config.max_natives });
        }

        let id = NativeId(self.natives.len() as u32);
        let value = match kind {
            NativeKind::Procedure => Value::NativeProc(id),
            NativeKind::Macro => Value::NativeMacro(id),
        };
        self.with_scope(|m| {
            let slot = m.alloc(value)?;
            m.roots.push(slot);
            let sym = m.intern(name)?;
            m.bind(sym, slot)
        })?;
        self.natives.push(Native { name, kind, func });
        Ok(())
    }

    pub fn markers(&self) -> &Markers {
        &self.markers
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn gc_stats(&self) -> &GcStats {
        self.collector.stats()
    }

    pub fn native_count(&self) -> usize {
        self.natives.len()
    }

    // ========================================================================
    // Allocation and collection
    // ========================================================================

    /// Allocate a slot for `value`, collecting once if the free list is
    /// exhausted. The handles inside `value` survive that collection.
    pub fn alloc(&mut self, value: Value) -> LispResult<ValueRef> {
        if let Some(r) = self.heap.try_alloc(value)? {
            return Ok(r);
        }
        self.collect_with(value)?;
        self.heap.try_alloc(value)?.ok_or(LispError::OutOfMemory {
            live: self.heap.live_count(),
            capacity: self.heap.capacity(),
        })
    }

    /// Force a full collection.
    pub fn collect(&mut self) -> LispResult<SweepOutcome> {
        self.collect_with(Value::Nil)
    }

    fn collect_with(&mut self, pending: Value) -> LispResult<SweepOutcome> {
        let pending = match pending {
            Value::Pair(head, tail) => [head, tail],
            _ => [ValueRef::NIL; 2],
        };
        let roots = self
            .symbols
            .bindings()
            .chain(self.roots.iter())
            .chain(pending);
        self.collector.collect(&mut self.heap, roots)
    }

    /// Run `f`, then pop every root it pushed, whether or not it failed.
    pub fn with_scope<T>(&mut self, f: impl FnOnce(&mut Self) -> LispResult<T>) -> LispResult<T> {
        let scope = self.roots.scope();
        let out = f(self);
        self.roots.restore(scope);
        out
    }

    pub fn int(&mut self, n: i64) -> LispResult<ValueRef> {
        if n == 1 {
            return Ok(ValueRef::TRUE);
        }
        self.alloc(Value::Integer(n))
    }

    pub fn cons(&mut self, head: ValueRef, tail: ValueRef) -> LispResult<ValueRef> {
        self.alloc(Value::Pair(head, tail))
    }

    /// Build a proper list from `items`.
    pub fn list(&mut self, items: &[ValueRef]) -> LispResult<ValueRef> {
        self.with_scope(|m| {
            m.roots.extend(items);
            let mut result = ValueRef::NIL;
            for &item in items.iter().rev() {
                result = m.cons(item, result)?;
            }
            Ok(result)
        })
    }

    /// `(quote x)` for pairs and symbols; other values are already inert.
    pub fn quoted(&mut self, x: ValueRef) -> LispResult<ValueRef> {
        match self.heap.kind(x)? {
            Kind::Pair | Kind::Symbol => {
                let quote = self.markers.quote;
                self.list(&[quote, x])
            }
            _ => Ok(x),
        }
    }

    // ========================================================================
    // Symbols and global bindings
    // ========================================================================

    /// Intern `name`, allocating its symbol slot on first use.
    /// `nil` and `NIL` read as the canonical empty list.
    pub fn intern(&mut self, name: &str) -> LispResult<ValueRef> {
        if name == "nil" || name == "NIL" {
            return Ok(ValueRef::NIL);
        }
        if let Some(node) = self.symbols.lookup(name) {
            return Ok(node);
        }
        self.symbols.validate_name(name)?;
        let id = self.symbols.next_id();
        let node = self.alloc(Value::Symbol(id))?;
        self.symbols.insert(name, node)?;
        Ok(node)
    }

    /// Bind `symbol` globally. Rebinding is a `Redefinition` once
    /// initialization has finished.
    pub fn bind(&mut self, symbol: ValueRef, value: ValueRef) -> LispResult<()> {
        let id = self.heap.symbol(symbol)?;
        if self.initializing && self.symbols.binding(id)? != ValueRef::UNBOUND {
            trace!(
                target: "slisp::init",
                symbol = self.symbols.name(id),
                "rebinding during initialization"
            );
        }
        self.symbols.bind(id, value, self.initializing)
    }

    /// Current global binding of a name, if the name is interned and bound.
    pub fn global(&self, name: &str) -> Option<ValueRef> {
        let node = self.symbols.lookup(name)?;
        let id = self.heap.symbol(node).ok()?;
        match self.symbols.binding(id) {
            Ok(b) if b != ValueRef::UNBOUND => Some(b),
            _ => None,
        }
    }

    fn symbol_name(&self, r: ValueRef) -> String {
        match self.heap.symbol(r) {
            Ok(id) => self.symbols.name(id).to_string(),
            Err(_) => self.print(r),
        }
    }

    pub fn print(&self, v: ValueRef) -> String {
        printer::print_val(v, &self.heap, &self.symbols)
    }

    // ========================================================================
    // Evaluation
    // ========================================================================

    /// Run `f` one nesting level deeper. Every recursive walk (evaluation,
    /// substitution, quasiquote expansion, reading) goes through here, so
    /// nesting is bounded by `max_eval_depth` and the native stack is grown
    /// on demand.
    pub(crate) fn descend<T>(&mut self, f: impl FnOnce(&mut Self) -> LispResult<T>) -> LispResult<T> {
        let max = self.config.max_eval_depth;
        if self.depth >= max {
            return Err(LispError::RecursionLimit { max });
        }
        self.depth += 1;
        let result = stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || f(self));
        self.depth -= 1;
        result
    }

    /// Evaluate one value.
    pub fn evaluate(&mut self, v: ValueRef) -> LispResult<ValueRef> {
        self.descend(|m| {
            if m.trace {
                debug!(target: "slisp::eval", "{}", m.print(v));
            }
            m.with_scope(|m| {
                m.roots.push(v);
                m.evaluate_inner(v)
            })
        })
    }

    fn evaluate_inner(&mut self, v: ValueRef) -> LispResult<ValueRef> {
        match self.heap.get(v)? {
            Value::Nil | Value::Integer(_) | Value::NativeProc(_) | Value::NativeMacro(_) => Ok(v),
            Value::Symbol(id) => {
                let binding = self.symbols.binding(id)?;
                if binding == ValueRef::UNBOUND {
                    return Err(LispError::UnboundVariable(self.symbols.name(id).to_string()));
                }
                Ok(binding)
            }
            Value::Pair(head, args) => self.evaluate_call(v, head, args),
            Value::Unbound => Err(LispError::Unreachable("the unbound sentinel was evaluated".into())),
            Value::Free(_) => Err(LispError::UseAfterFree { index: v.index() }),
        }
    }

    fn evaluate_call(&mut self, form: ValueRef, head: ValueRef, args: ValueRef) -> LispResult<ValueRef> {
        // A function or macro literal is a value.
        if self.is_functionlike(head) {
            return Ok(form);
        }
        if head == self.markers.def {
            return self.define(args);
        }

        let fun = self.evaluate(head)?;
        self.roots.push(fun);

        match self.heap.get(fun)? {
            Value::NativeProc(id) => {
                let args = self.evaluate_elements(args)?;
                self.roots.push(args);
                self.call_native(id, args)
            }
            Value::NativeMacro(id) => self.call_native(id, args),
            Value::Pair(fun_head, _) if self.is_functionlike(fun_head) => self.apply(fun, args),
            _ if fun == self.markers.pragma => {
                self.trace = true;
                Ok(ValueRef::NIL)
            }
            _ => Err(LispError::Unreachable(format!(
                "cannot apply `{}`",
                self.print(fun)
            ))),
        }
    }

    fn call_native(&mut self, id: NativeId, args: ValueRef) -> LispResult<ValueRef> {
        let func = self
            .natives
            .get(id.0 as usize)
            .map(|n| n.func)
            .ok_or_else(|| LispError::Unreachable(format!("no native registered as {:?}", id)))?;
        func(self, args)
    }

    /// `(def name expr)`: evaluate `expr` and bind it to `name` for good.
    fn define(&mut self, args: ValueRef) -> LispResult<ValueRef> {
        let name = self.form_part(args, 0, "def", "name")?;
        let expr = self.form_part(args, 1, "def", "value")?;
        if self.heap.kind(name)? != Kind::Symbol {
            return Err(LispError::MalformedForm(format!(
                "`def` needs a symbol name, got `{}`",
                self.print(name)
            )));
        }
        let value = self.evaluate(expr)?;
        self.bind(name, value)?;
        Ok(ValueRef::NIL)
    }

    /// Apply a lambda or macro literal by substituting arguments into its
    /// body. Placeholder arguments leave their parameter open, and the result
    /// is then a new literal over the open parameters.
    fn apply(&mut self, fun: ValueRef, args: ValueRef) -> LispResult<ValueRef> {
        let fun_head = self.heap.head(fun)?;
        let formals = self.form_part(fun, 1, "function literal", "parameter list")?;
        let mut body = self.form_part(fun, 2, "function literal", "body")?;
        let is_macro = fun_head == self.markers.macro_;

        let mut args = if is_macro { args } else { self.evaluate_elements(args)? };
        self.roots.push(args);

        let mut open = Vec::new();
        let mut cursor = formals;
        while let Value::Pair(formal, rest) = self.heap.get(cursor)? {
            if self.heap.kind(formal)? != Kind::Symbol {
                return Err(LispError::MalformedForm(format!(
                    "parameter `{}` is not a symbol",
                    self.print(formal)
                )));
            }
            let (arg, more) = match self.heap.get(args)? {
                Value::Pair(arg, more) => (arg, more),
                _ => {
                    return Err(LispError::MalformedForm(format!(
                        "missing argument for `{}`",
                        self.symbol_name(formal)
                    )))
                }
            };

            if arg == self.markers.partial {
                open.push(formal);
            } else {
                body = self.beta_reduce(body, formal, arg, 0)?;
                self.roots.push(body);
            }
            cursor = rest;
            args = more;
        }

        if !open.is_empty() {
            let formals = self.list(&open)?;
            self.roots.push(formals);
            return self.list(&[fun_head, formals, body]);
        }

        if is_macro {
            body = self.evaluate(body)?;
        }
        self.evaluate(body)
    }

    /// Replace free occurrences of `formal` in `code` with the quoted `arg`.
    ///
    /// `depth` counts enclosing quasiquotes minus unquotes; substitution only
    /// happens at depth zero. Nested literals that redeclare `formal` are
    /// left alone, and sublists without an occurrence are shared.
    pub fn beta_reduce(
        &mut self,
        code: ValueRef,
        formal: ValueRef,
        arg: ValueRef,
        depth: usize,
    ) -> LispResult<ValueRef> {
        self.descend(|m| m.beta_reduce_form(code, formal, arg, depth))
    }

    fn beta_reduce_form(
        &mut self,
        code: ValueRef,
        formal: ValueRef,
        arg: ValueRef,
        depth: usize,
    ) -> LispResult<ValueRef> {
        let (head, tail) = match self.heap.get(code)? {
            Value::Symbol(_) if code == formal && depth == 0 => return self.quoted(arg),
            Value::Pair(head, tail) => (head, tail),
            _ => return Ok(code),
        };
        let markers = self.markers;

        if head == markers.quote {
            if depth == 0 {
                return Ok(code);
            }
            let inner = self.form_part(code, 1, "quote", "argument")?;
            let reduced = self.beta_reduce(inner, formal, arg, depth)?;
            return self.quoted(reduced);
        }
        if head == markers.unquote || head == markers.quasiquote {
            let inner_depth = if head == markers.quasiquote {
                depth + 1
            } else if depth == 0 {
                return Err(LispError::MalformedForm("unquote outside of quasiquote".into()));
            } else {
                depth - 1
            };
            let body = self.beta_reduce(tail, formal, arg, inner_depth)?;
            if body == tail {
                return Ok(code);
            }
            return self.cons(head, body);
        }
        if self.is_functionlike(head) && depth == 0 {
            let params = self.form_part(code, 1, "function literal", "parameter list")?;
            let fun_body = self.form_part(code, 2, "function literal", "body")?;
            if self.heap.list_to_vec(params)?.contains(&formal) {
                return Ok(code);
            }
            let new_body = self.beta_reduce(fun_body, formal, arg, depth)?;
            if new_body == fun_body {
                return Ok(code);
            }
            return self.list(&[head, params, new_body]);
        }

        self.beta_reduce_spine(code, formal, arg, depth)
    }

    /// Substitute into each element of a plain list, walking the spine
    /// iteratively. A tail that is itself a special form or an atom is
    /// reduced as a whole.
    fn beta_reduce_spine(
        &mut self,
        code: ValueRef,
        formal: ValueRef,
        arg: ValueRef,
        depth: usize,
    ) -> LispResult<ValueRef> {
        self.with_scope(|m| {
            let mut nodes = Vec::new();
            let mut cursor = code;
            while let Value::Pair(head, tail) = m.heap.get(cursor)? {
                if !nodes.is_empty() && m.is_substitution_boundary(head, depth) {
                    break;
                }
                let new_head = m.beta_reduce(head, formal, arg, depth)?;
                m.roots.push(new_head);
                nodes.push((cursor, head, tail, new_head));
                cursor = tail;
            }

            let mut result = m.beta_reduce(cursor, formal, arg, depth)?;
            for &(node, head, tail, new_head) in nodes.iter().rev() {
                result = if new_head == head && result == tail {
                    node
                } else {
                    m.cons(new_head, result)?
                };
            }
            Ok(result)
        })
    }

    /// Heads that give a list node its own substitution rule.
    fn is_substitution_boundary(&self, head: ValueRef, depth: usize) -> bool {
        let markers = &self.markers;
        head == markers.quote
            || head == markers.unquote
            || head == markers.quasiquote
            || (depth == 0 && self.is_functionlike(head))
    }

    /// Evaluate each element of a list, left to right, into a fresh list.
    /// An improper tail is evaluated as an atom.
    pub fn evaluate_elements(&mut self, list: ValueRef) -> LispResult<ValueRef> {
        self.with_scope(|m| {
            let mut items = Vec::new();
            let mut cursor = list;
            while let Value::Pair(head, tail) = m.heap.get(cursor)? {
                let value = m.evaluate(head)?;
                m.roots.push(value);
                items.push(value);
                cursor = tail;
            }

            let mut result = m.evaluate(cursor)?;
            for &item in items.iter().rev() {
                result = m.cons(item, result)?;
            }
            Ok(result)
        })
    }

    pub fn is_functionlike(&self, r: ValueRef) -> bool {
        r == self.markers.lambda || r == self.markers.macro_
    }

    /// `idx`-th element of a special form, or `MalformedForm` naming what is
    /// missing.
    pub fn form_part(&self, list: ValueRef, idx: usize, form: &str, what: &str) -> LispResult<ValueRef> {
        self.heap.elem(list, idx).map_err(|e| match e {
            LispError::WrongKind { .. } => {
                LispError::MalformedForm(format!("`{}` is missing its {}", form, what))
            }
            other => other,
        })
    }

    // ========================================================================
    // Sessions
    // ========================================================================

    /// Read and evaluate every top-level form in `source`, handing each
    /// result to `on_result`. Stops at the first error.
    pub fn run(
        &mut self,
        source: &str,
        mut on_result: impl FnMut(&Machine, ValueRef),
    ) -> LispResult<()> {
        let mut pos = 0;
        while let Some((expr, next)) = reader::read_one_at(self, source, pos)? {
            pos = next;
            let value = self.evaluate(expr)?;
            on_result(self, value);
        }
        Ok(())
    }

    /// Evaluate `source` and return the value of its last form.
    pub fn eval_str(&mut self, source: &str) -> LispResult<ValueRef> {
        let mut last = ValueRef::NIL;
        self.run(source, |_, v| last = v)?;
        Ok(last)
    }

    /// Bind `input` to the list of byte codes in `bytes`.
    pub fn bind_input(&mut self, bytes: &[u8]) -> LispResult<()> {
        self.with_scope(|m| {
            let mut list = ValueRef::NIL;
            for &byte in bytes.iter().rev() {
                m.roots.push(list);
                let code = m.int(byte as i64)?;
                list = m.cons(code, list)?;
            }
            m.roots.push(list);
            let sym = m.intern("input")?;
            m.bind(sym, list)
        })
    }

    /// Read a file fully into memory and bind it as `input`.
    pub fn bind_input_file(&mut self, path: impl AsRef<Path>) -> LispResult<()> {
        let bytes = std::fs::read(path.as_ref()).map_err(|e| {
            LispError::Io(format!("{}: {}", path.as_ref().display(), e))
        })?;
        self.bind_input(&bytes)
    }

    /// Render every live slot and every symbol entry.
    pub fn dump(&self) -> String {
        let mut out = String::from("-===- DUMP BEGIN -===-\n");
        for (r, value) in self.heap.live_slots() {
            if value == Value::Unbound {
                continue;
            }
            out.push_str(&format!("{:04}: `{}`\n", r.index(), self.print(r)));
        }
        out.push('\n');
        for (id, name, binding) in self.symbols.iter() {
            out.push_str(&format!(".{:03}: ({:03}) `{}`\n", id.0, binding.index(), name));
        }
        out.push_str("-===- DUMP END -===-\n");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine() -> Machine {
        Machine::new(Config::default()).unwrap()
    }

    fn eval(m: &mut Machine, src: &str) -> String {
        let v = m.eval_str(src).unwrap();
        m.print(v)
    }

    #[test]
    fn markers_evaluate_to_themselves() {
        let mut m = machine();
        assert_eq!(eval(&mut m, ".."), "..");
        assert_eq!(eval(&mut m, "def"), "def");
    }

    #[test]
    fn lambda_literal_is_a_value() {
        let mut m = machine();
        assert_eq!(eval(&mut m, "(.\\ (x) (+ x 1))"), "(.\\ (x) (+ x 1))");
    }

    #[test]
    fn beta_reduce_quotes_list_arguments() {
        let mut m = machine();
        let code = m.eval_str("'(head x)").unwrap();
        m.roots.push(code);
        let x = m.intern("x").unwrap();
        let arg = m.eval_str("'(1 2)").unwrap();
        m.roots.push(arg);
        let out = m.beta_reduce(code, x, arg, 0).unwrap();
        assert_eq!(m.print(out), "(head (quote (1 2)))");
    }

    #[test]
    fn beta_reduce_leaves_shadowing_literal_untouched() {
        let mut m = machine();
        let code = m.eval_str("'(+ x ((.\\ (x) x) 2))").unwrap();
        m.roots.push(code);
        let x = m.intern("x").unwrap();
        let out = m.beta_reduce(code, x, ValueRef::TRUE, 0).unwrap();
        assert_eq!(m.print(out), "(+ 1 ((.\\ (x) x) 2))");
    }

    #[test]
    fn beta_reduce_respects_quasiquote_depth() {
        let mut m = machine();
        let code = m.eval_str("'(quasiquote (x (unquote x)))").unwrap();
        m.roots.push(code);
        let x = m.intern("x").unwrap();
        let seven = m.int(7).unwrap();
        let out = m.beta_reduce(code, x, seven, 0).unwrap();
        assert_eq!(m.print(out), "(quasiquote (x (unquote 7)))");
    }

    #[test]
    fn beta_reduce_requotes_quoted_forms_under_quasiquote() {
        let mut m = machine();
        let code = m.eval_str("'(quasiquote (a (quote 3) (quote x) (unquote x)))").unwrap();
        m.roots.push(code);
        let x = m.intern("x").unwrap();
        let seven = m.int(7).unwrap();
        let out = m.beta_reduce(code, x, seven, 0).unwrap();
        assert_eq!(m.print(out), "(quasiquote (a 3 (quote x) (unquote 7)))");
    }

    #[test]
    fn beta_reduce_walks_long_lists() {
        let mut m = machine();
        let body = format!("'(f {} x)", vec!["y"; 20_000].join(" "));
        let code = m.eval_str(&body).unwrap();
        m.roots.push(code);
        let x = m.intern("x").unwrap();
        let out = m.beta_reduce(code, x, ValueRef::TRUE, 0).unwrap();
        let items = m.heap.list_to_vec(out).unwrap();
        assert_eq!(items.len(), 20_002);
        assert_eq!(items[20_001], ValueRef::TRUE);
    }

    #[test]
    fn init_summary_stays_out_of_the_evaluation_trace() {
        use std::sync::{Arc, Mutex};
        use tracing_subscriber::layer::{Context, SubscriberExt};
        use tracing_subscriber::Layer;

        struct Targets(Arc<Mutex<Vec<String>>>);

        impl<S: tracing::Subscriber> Layer<S> for Targets {
            fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
                self.0.lock().unwrap().push(event.metadata().target().to_string());
            }
        }

        let seen = Arc::new(Mutex::new(Vec::new()));
        let subscriber = tracing_subscriber::registry().with(Targets(seen.clone()));
        tracing::subscriber::with_default(subscriber, || {
            Machine::new(Config::default()).unwrap();
        });

        let seen = seen.lock().unwrap();
        assert!(seen.iter().any(|t| t == "slisp::init"));
        assert!(seen.iter().all(|t| t != "slisp::eval"));
    }

    #[test]
    fn beta_reduce_shares_unchanged_structure() {
        let mut m = machine();
        let code = m.eval_str("'(a (b c) d)").unwrap();
        let x = m.intern("x").unwrap();
        assert_eq!(m.beta_reduce(code, x, ValueRef::TRUE, 0).unwrap(), code);
    }

    #[test]
    fn unquote_at_depth_zero_is_malformed() {
        let mut m = machine();
        let code = m.eval_str("'(unquote x)").unwrap();
        let x = m.intern("x").unwrap();
        assert!(matches!(
            m.beta_reduce(code, x, ValueRef::TRUE, 0),
            Err(LispError::MalformedForm(_))
        ));
    }

    #[test]
    fn evaluate_elements_handles_improper_tail() {
        let mut m = machine();
        m.eval_str("(def two 2)").unwrap();
        let list = m.eval_str("'((+ 1 2) . two)").unwrap();
        let out = m.evaluate_elements(list).unwrap();
        assert_eq!(m.print(out), "(3 . 2)");
    }

    #[test]
    fn roots_are_balanced_after_errors() {
        let mut m = machine();
        assert!(m.eval_str("(+ 1 (head nope))").is_err());
        assert!(m.roots.is_empty());
        m.eval_str("(+ 1 2)").unwrap();
        assert!(m.roots.is_empty());
    }

    #[test]
    fn pragma_enables_tracing() {
        let mut m = machine();
        assert!(!m.trace);
        assert_eq!(eval(&mut m, "(pragma)"), "nil");
        assert!(m.trace);
    }

    #[test]
    fn recursion_limit_stops_runaway_evaluation() {
        let config = Config { max_eval_depth: 64, ..Config::default() };
        let mut m = Machine::new(config).unwrap();
        m.eval_str("(def loop (.\\ (n) (loop n)))").unwrap();
        assert_eq!(m.eval_str("(loop 1)"), Err(LispError::RecursionLimit { max: 64 }));
    }

    #[test]
    fn dump_lists_symbols_and_live_slots() {
        let m = machine();
        let dump = m.dump();
        assert!(dump.starts_with("-===- DUMP BEGIN -===-"));
        assert!(dump.contains("`.\\`"));
        assert!(dump.contains("<builtin>"));
    }
}
