use crate::eval::{STACK_GROW_SIZE, STACK_RED_ZONE};
use crate::heap::Heap;
use crate::symbol::SymbolTable;
use crate::value::{Value, ValueRef};

/// Print a value to a string.
///
/// Printing never fails: a handle that no longer names a live slot renders
/// as `<freed>` so diagnostics can still show the surrounding structure.
pub fn print_val(val: ValueRef, heap: &Heap, symbols: &SymbolTable) -> String {
    let mut out = String::new();
    print_inner(val, heap, symbols, &mut out, 0);
    out
}

fn print_inner(val: ValueRef, heap: &Heap, symbols: &SymbolTable, out: &mut String, depth: usize) {
    stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || {
        print_value(val, heap, symbols, out, depth)
    })
}

fn print_value(val: ValueRef, heap: &Heap, symbols: &SymbolTable, out: &mut String, depth: usize) {
    if depth > 1000 {
        out.push_str("...");
        return;
    }

    let Ok(value) = heap.get(val) else {
        out.push_str("<freed>");
        return;
    };

    match value {
        Value::Nil => out.push_str("nil"),
        Value::Integer(n) => out.push_str(&n.to_string()),
        Value::Symbol(id) => out.push_str(symbols.name(id)),
        Value::NativeProc(_) | Value::NativeMacro(_) => out.push_str("<builtin>"),
        Value::Unbound => out.push_str("<unbound>"),
        Value::Free(_) => out.push_str("<freed>"),
        Value::Pair(head, tail) => {
            out.push('(');
            print_inner(head, heap, symbols, out, depth + 1);

            let mut current = tail;
            loop {
                match heap.get(current) {
                    Ok(Value::Nil) => break,
                    Ok(Value::Pair(head, tail)) => {
                        out.push(' ');
                        print_inner(head, heap, symbols, out, depth + 1);
                        current = tail;
                    }
                    _ => {
                        out.push_str(" . ");
                        print_inner(current, heap, symbols, out, depth + 1);
                        break;
                    }
                }
            }
            out.push(')');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::SymbolId;

    fn alloc(heap: &mut Heap, value: Value) -> ValueRef {
        heap.try_alloc(value).unwrap().unwrap()
    }

    #[test]
    fn prints_atoms() {
        let mut heap = Heap::new(16);
        let mut symbols = SymbolTable::new(4, 15);
        let sym = alloc(&mut heap, Value::Symbol(SymbolId(0)));
        symbols.insert("foo", sym).unwrap();
        let native = alloc(&mut heap, Value::NativeProc(crate::value::NativeId(0)));
        let neg = alloc(&mut heap, Value::Integer(-12));

        assert_eq!(print_val(ValueRef::NIL, &heap, &symbols), "nil");
        assert_eq!(print_val(neg, &heap, &symbols), "-12");
        assert_eq!(print_val(sym, &heap, &symbols), "foo");
        assert_eq!(print_val(native, &heap, &symbols), "<builtin>");
        assert_eq!(print_val(ValueRef::UNBOUND, &heap, &symbols), "<unbound>");
    }

    #[test]
    fn prints_proper_and_improper_lists() {
        let mut heap = Heap::new(16);
        let symbols = SymbolTable::new(4, 15);
        let two = alloc(&mut heap, Value::Integer(2));
        let proper = alloc(&mut heap, Value::Pair(two, ValueRef::NIL));
        let proper = alloc(&mut heap, Value::Pair(ValueRef::TRUE, proper));
        let dotted = alloc(&mut heap, Value::Pair(ValueRef::TRUE, two));
        let nested = alloc(&mut heap, Value::Pair(proper, dotted));

        assert_eq!(print_val(proper, &heap, &symbols), "(1 2)");
        assert_eq!(print_val(dotted, &heap, &symbols), "(1 . 2)");
        assert_eq!(print_val(nested, &heap, &symbols), "((1 2) 1 . 2)");
    }

    #[test]
    fn stale_handles_print_as_freed() {
        let mut heap = Heap::new(8);
        let symbols = SymbolTable::new(4, 15);
        let gone = alloc(&mut heap, Value::Integer(5));
        heap.advance_generation();
        heap.sweep();
        assert_eq!(print_val(gone, &heap, &symbols), "<freed>");
    }
}
