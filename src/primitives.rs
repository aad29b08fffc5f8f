use crate::error::{LispError, LispResult};
use crate::eval::Machine;
use crate::value::{Kind, Value, ValueRef};

/// Signature shared by every native. Procedures receive their evaluated
/// argument list; macros receive the raw one.
pub type NativeFn = fn(&mut Machine, ValueRef) -> LispResult<ValueRef>;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum NativeKind {
    Procedure,
    Macro,
}

/// Registry entry for one native.
#[derive(Clone, Copy)]
pub struct Native {
    pub name: &'static str,
    pub kind: NativeKind,
    pub func: NativeFn,
}

/// Install the builtin catalogue. `quote` and `quasiquote` replace the
/// markers' self-bindings, which is allowed only during initialization.
pub fn register_builtins(m: &mut Machine) -> LispResult<()> {
    use NativeKind::{Macro, Procedure};

    let natives: [(&'static str, NativeKind, NativeFn); 21] = [
        ("=", Procedure, prim_eq),
        ("<", Procedure, prim_lt),
        (">", Procedure, prim_gt),
        ("<=", Procedure, prim_lte),
        (">=", Procedure, prim_gte),
        ("+", Procedure, prim_sum),
        ("*", Procedure, prim_prod),
        ("-", Procedure, prim_sub),
        ("nil?", Procedure, prim_is_nil),
        ("int?", Procedure, prim_is_int),
        ("sym?", Procedure, prim_is_sym),
        ("pair?", Procedure, prim_is_pair),
        ("list?", Procedure, prim_is_list),
        ("cons", Procedure, prim_cons),
        ("head", Procedure, prim_head),
        ("tail", Procedure, prim_tail),
        ("list", Procedure, prim_list),
        ("quote", Macro, prim_quote),
        ("quasiquote", Macro, prim_quasiquote),
        ("cond", Macro, prim_cond),
        ("gc", Procedure, prim_gc),
    ];

    for (name, kind, func) in natives {
        m.register_native(name, kind, func)?;
    }
    Ok(())
}

/// The `idx`-th argument, or `MalformedForm` naming the native.
fn arg(m: &Machine, args: ValueRef, idx: usize, name: &str) -> LispResult<ValueRef> {
    m.form_part(args, idx, name, "argument")
}

fn ints(m: &Machine, args: ValueRef) -> LispResult<Vec<i64>> {
    m.heap
        .list_to_vec(args)?
        .into_iter()
        .map(|v| m.heap.int(v))
        .collect()
}

// === Comparison ===

/// Structural equality; symbols compare by identity.
fn equal(m: &Machine, a: ValueRef, b: ValueRef) -> LispResult<bool> {
    let mut pending = vec![(a, b)];
    while let Some((a, b)) = pending.pop() {
        if a == b {
            continue;
        }
        let same = match (m.heap.get(a)?, m.heap.get(b)?) {
            (Value::Integer(x), Value::Integer(y)) => x == y,
            (Value::Symbol(x), Value::Symbol(y)) => x == y,
            (Value::Pair(ah, at), Value::Pair(bh, bt)) => {
                pending.push((at, bt));
                pending.push((ah, bh));
                true
            }
            _ => false,
        };
        if !same {
            return Ok(false);
        }
    }
    Ok(true)
}

/// (= a b)
fn prim_eq(m: &mut Machine, args: ValueRef) -> LispResult<ValueRef> {
    let a = arg(m, args, 0, "=")?;
    let b = arg(m, args, 1, "=")?;
    Ok(ValueRef::from_bool(equal(m, a, b)?))
}

/// True when `cmp` holds for every adjacent pair of arguments.
fn chain(m: &Machine, args: ValueRef, cmp: fn(i64, i64) -> bool) -> LispResult<ValueRef> {
    let values = ints(m, args)?;
    Ok(ValueRef::from_bool(values.windows(2).all(|w| cmp(w[0], w[1]))))
}

fn prim_lt(m: &mut Machine, args: ValueRef) -> LispResult<ValueRef> {
    chain(m, args, |a, b| a < b)
}

fn prim_gt(m: &mut Machine, args: ValueRef) -> LispResult<ValueRef> {
    chain(m, args, |a, b| a > b)
}

fn prim_lte(m: &mut Machine, args: ValueRef) -> LispResult<ValueRef> {
    chain(m, args, |a, b| a <= b)
}

fn prim_gte(m: &mut Machine, args: ValueRef) -> LispResult<ValueRef> {
    chain(m, args, |a, b| a >= b)
}

// === Arithmetic ===

fn prim_sum(m: &mut Machine, args: ValueRef) -> LispResult<ValueRef> {
    let total = ints(m, args)?.into_iter().fold(0i64, i64::wrapping_add);
    m.int(total)
}

fn prim_prod(m: &mut Machine, args: ValueRef) -> LispResult<ValueRef> {
    let total = ints(m, args)?.into_iter().fold(1i64, i64::wrapping_mul);
    m.int(total)
}

/// (- a) negates; (- a b ...) subtracts the rest from `a`.
fn prim_sub(m: &mut Machine, args: ValueRef) -> LispResult<ValueRef> {
    let values = ints(m, args)?;
    let result = match values.split_first() {
        None => 0,
        Some((&only, [])) => only.wrapping_neg(),
        Some((&first, rest)) => rest.iter().fold(first, |acc, &n| acc.wrapping_sub(n)),
    };
    m.int(result)
}

// === Predicates ===

fn is_kind(m: &Machine, args: ValueRef, name: &str, kind: Kind) -> LispResult<ValueRef> {
    let v = arg(m, args, 0, name)?;
    Ok(ValueRef::from_bool(m.heap.kind(v)? == kind))
}

fn prim_is_nil(m: &mut Machine, args: ValueRef) -> LispResult<ValueRef> {
    is_kind(m, args, "nil?", Kind::Nil)
}

fn prim_is_int(m: &mut Machine, args: ValueRef) -> LispResult<ValueRef> {
    is_kind(m, args, "int?", Kind::Integer)
}

fn prim_is_sym(m: &mut Machine, args: ValueRef) -> LispResult<ValueRef> {
    is_kind(m, args, "sym?", Kind::Symbol)
}

fn prim_is_pair(m: &mut Machine, args: ValueRef) -> LispResult<ValueRef> {
    is_kind(m, args, "pair?", Kind::Pair)
}

fn prim_is_list(m: &mut Machine, args: ValueRef) -> LispResult<ValueRef> {
    let v = arg(m, args, 0, "list?")?;
    Ok(ValueRef::from_bool(m.heap.is_proper_list(v)?))
}

// === Lists ===

fn prim_cons(m: &mut Machine, args: ValueRef) -> LispResult<ValueRef> {
    let head = arg(m, args, 0, "cons")?;
    let tail = arg(m, args, 1, "cons")?;
    m.cons(head, tail)
}

fn prim_head(m: &mut Machine, args: ValueRef) -> LispResult<ValueRef> {
    let list = arg(m, args, 0, "head")?;
    m.heap.head(list)
}

fn prim_tail(m: &mut Machine, args: ValueRef) -> LispResult<ValueRef> {
    let list = arg(m, args, 0, "tail")?;
    m.heap.tail(list)
}

/// The evaluated argument list is already a fresh list.
fn prim_list(_m: &mut Machine, args: ValueRef) -> LispResult<ValueRef> {
    Ok(args)
}

/// (gc) forces a collection and returns the number of reclaimed slots.
fn prim_gc(m: &mut Machine, _args: ValueRef) -> LispResult<ValueRef> {
    let outcome = m.collect()?;
    m.int(outcome.reclaimed as i64)
}

// === Special forms ===

/// (quote x) returns `x` unevaluated.
fn prim_quote(m: &mut Machine, args: ValueRef) -> LispResult<ValueRef> {
    arg(m, args, 0, "quote")
}

/// (quasiquote template)
fn prim_quasiquote(m: &mut Machine, args: ValueRef) -> LispResult<ValueRef> {
    let template = arg(m, args, 0, "quasiquote")?;
    expand_quasiquote(m, template, 0)
}

/// Copy `template`, evaluating `unquote` forms that belong to the outermost
/// quasiquote. Inner quasiquote/unquote pairs stay literal.
fn expand_quasiquote(m: &mut Machine, template: ValueRef, depth: usize) -> LispResult<ValueRef> {
    m.descend(|m| expand_form(m, template, depth))
}

fn expand_form(m: &mut Machine, template: ValueRef, depth: usize) -> LispResult<ValueRef> {
    let (head, tail) = match m.heap.get(template)? {
        Value::Pair(head, tail) => (head, tail),
        _ => return Ok(template),
    };
    let markers = *m.markers();

    if head == markers.unquote {
        if depth == 0 {
            let expr = m.form_part(template, 1, "unquote", "expression")?;
            return m.evaluate(expr);
        }
        let body = expand_quasiquote(m, tail, depth - 1)?;
        return rebuild(m, template, head, tail, head, body);
    }
    if head == markers.quasiquote {
        let body = expand_quasiquote(m, tail, depth + 1)?;
        return rebuild(m, template, head, tail, head, body);
    }

    // Plain list: expand each element along the spine, stopping at a tail
    // that is itself an unquote or quasiquote form.
    m.with_scope(|m| {
        let mut nodes = Vec::new();
        let mut cursor = template;
        while let Value::Pair(head, tail) = m.heap.get(cursor)? {
            if !nodes.is_empty() && (head == markers.unquote || head == markers.quasiquote) {
                break;
            }
            let new_head = expand_quasiquote(m, head, depth)?;
            m.roots.push(new_head);
            nodes.push((cursor, head, tail, new_head));
            cursor = tail;
        }

        let mut result = expand_quasiquote(m, cursor, depth)?;
        for &(node, head, tail, new_head) in nodes.iter().rev() {
            result = rebuild(m, node, head, tail, new_head, result)?;
        }
        Ok(result)
    })
}

/// Reuse `original` when neither half changed.
fn rebuild(
    m: &mut Machine,
    original: ValueRef,
    head: ValueRef,
    tail: ValueRef,
    new_head: ValueRef,
    new_tail: ValueRef,
) -> LispResult<ValueRef> {
    if head == new_head && tail == new_tail {
        Ok(original)
    } else {
        m.cons(new_head, new_tail)
    }
}

/// (cond (test expr) ...) evaluates the expr of the first non-nil test.
fn prim_cond(m: &mut Machine, args: ValueRef) -> LispResult<ValueRef> {
    let mut branches = args;
    while let Value::Pair(branch, rest) = m.heap.get(branches)? {
        let test = m.form_part(branch, 0, "cond", "test")?;
        let expr = m.form_part(branch, 1, "cond", "branch expression")?;
        if m.evaluate(test)?.is_truthy() {
            return m.evaluate(expr);
        }
        branches = rest;
    }
    if branches.is_nil() {
        Ok(ValueRef::NIL)
    } else {
        Err(LispError::MalformedForm("`cond` branches must form a list".into()))
    }
}
