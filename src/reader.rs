use crate::error::{LispError, LispResult};
use crate::eval::{Machine, STACK_GROW_SIZE, STACK_RED_ZONE};
use crate::value::ValueRef;

/// Parses source text into values allocated in the machine's arena.
///
/// Every finished sub-form is pushed onto the root stack until its enclosing
/// list is built, so a collection triggered mid-read cannot reclaim it.
/// Nesting deeper than the machine's evaluation limit is rejected.
pub struct Reader<'a> {
    input: &'a [u8],
    pos: usize,
    depth: usize,
    machine: &'a mut Machine,
}

impl<'a> Reader<'a> {
    pub fn new(input: &'a str, machine: &'a mut Machine) -> Self {
        Reader {
            input: input.as_bytes(),
            pos: 0,
            depth: 0,
            machine,
        }
    }

    /// Read one expression. Returns None at EOF.
    pub fn read(&mut self) -> LispResult<Option<ValueRef>> {
        self.skip_whitespace_and_comments();
        if self.pos >= self.input.len() {
            return Ok(None);
        }
        let val = self.read_expr()?;
        Ok(Some(val))
    }

    /// Return current position in input.
    pub fn position(&self) -> usize {
        self.pos
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let ch = self.peek()?;
        self.pos += 1;
        Some(ch)
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            while matches!(self.peek(), Some(ch) if is_whitespace(ch)) {
                self.pos += 1;
            }
            if self.peek() == Some(b';') {
                while matches!(self.peek(), Some(ch) if ch != b'\n') {
                    self.pos += 1;
                }
            } else {
                break;
            }
        }
    }

    fn read_expr(&mut self) -> LispResult<ValueRef> {
        let max = self.machine.config().max_eval_depth;
        if self.depth >= max {
            return Err(LispError::RecursionLimit { max });
        }
        self.depth += 1;
        let result = stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || self.read_form());
        self.depth -= 1;
        result
    }

    fn read_form(&mut self) -> LispResult<ValueRef> {
        self.skip_whitespace_and_comments();

        let ch = self.peek().ok_or_else(unexpected_eof)?;

        match ch {
            b'(' => self.read_list(),
            b')' => Err(LispError::Syntax(format!("unexpected ')' at byte {}", self.pos))),
            b'\'' => self.read_prefixed("quote"),
            b'`' => self.read_prefixed("quasiquote"),
            b'#' => self.read_prefixed("unquote"),
            b'"' => self.read_string(),
            c if c.is_ascii_digit() => self.read_number(),
            _ => self.read_symbol(),
        }
    }

    /// Read a list: (a b c) or (a . b) or (a b . c)
    fn read_list(&mut self) -> LispResult<ValueRef> {
        self.advance(); // consume '('
        let scope = self.machine.roots.scope();
        let result = self.read_list_body();
        self.machine.roots.restore(scope);
        result
    }

    fn read_list_body(&mut self) -> LispResult<ValueRef> {
        let mut elements = Vec::new();
        let mut dot_tail = ValueRef::NIL;

        loop {
            self.skip_whitespace_and_comments();
            match self.peek() {
                None => return Err(unexpected_eof()),
                Some(b')') => {
                    self.advance();
                    break;
                }
                Some(b'.') if !elements.is_empty() && self.is_dot_separator() => {
                    self.advance(); // consume '.'
                    dot_tail = self.read_expr()?;
                    self.machine.roots.push(dot_tail);
                    self.skip_whitespace_and_comments();
                    if self.advance() != Some(b')') {
                        return Err(LispError::Syntax("expected ')' after dotted tail".into()));
                    }
                    break;
                }
                Some(_) => {
                    let element = self.read_expr()?;
                    self.machine.roots.push(element);
                    elements.push(element);
                }
            }
        }

        let mut result = dot_tail;
        for &val in elements.iter().rev() {
            result = self.machine.cons(val, result)?;
        }
        Ok(result)
    }

    /// A '.' is a separator only when it stands alone, so `..` and `.\`
    /// still read as symbols.
    fn is_dot_separator(&self) -> bool {
        match self.input.get(self.pos + 1) {
            None => true,
            Some(&next) => is_whitespace(next) || next == b'(' || next == b')',
        }
    }

    /// 'x, `x and #x expand to (quote x), (quasiquote x), (unquote x).
    fn read_prefixed(&mut self, marker: &str) -> LispResult<ValueRef> {
        self.advance(); // consume prefix
        if self.peek().is_none() {
            return Err(LispError::Syntax(format!("`{}` prefix without a form", marker)));
        }
        let inner = self.read_expr()?;
        self.machine.with_scope(|m| {
            m.roots.push(inner);
            let sym = m.intern(marker)?;
            m.list(&[sym, inner])
        })
    }

    /// "abc" reads as (quote (97 98 99)).
    fn read_string(&mut self) -> LispResult<ValueRef> {
        self.advance(); // consume '"'
        let start = self.pos;
        while self.peek().ok_or_else(unexpected_eof)? != b'"' {
            self.pos += 1;
        }
        let bytes = self.input[start..self.pos].to_vec();
        self.advance(); // consume closing '"'

        self.machine.with_scope(|m| {
            let mut list = ValueRef::NIL;
            for &byte in bytes.iter().rev() {
                m.roots.push(list);
                let code = m.int(byte as i64)?;
                list = m.cons(code, list)?;
            }
            m.roots.push(list);
            let quote = m.intern("quote")?;
            m.list(&[quote, list])
        })
    }

    fn read_number(&mut self) -> LispResult<ValueRef> {
        let start = self.pos;
        let mut value: i64 = 0;
        while let Some(ch) = self.peek().filter(u8::is_ascii_digit) {
            value = value
                .checked_mul(10)
                .and_then(|v| v.checked_add((ch - b'0') as i64))
                .ok_or_else(|| {
                    LispError::Syntax(format!("integer literal at byte {} is out of range", start))
                })?;
            self.pos += 1;
        }
        self.machine.int(value)
    }

    fn read_symbol(&mut self) -> LispResult<ValueRef> {
        let start = self.pos;
        while matches!(self.peek(), Some(ch) if !is_whitespace(ch) && ch != b'(' && ch != b')') {
            self.pos += 1;
        }
        let name = std::str::from_utf8(&self.input[start..self.pos])
            .map_err(|_| LispError::Syntax(format!("symbol at byte {} is not valid UTF-8", start)))?;
        self.machine.intern(name)
    }
}

fn is_whitespace(ch: u8) -> bool {
    ch == b' ' || ch == b'\t' || ch == b'\n' || ch == b'\r'
}

fn unexpected_eof() -> LispError {
    LispError::Syntax("unexpected end of input".into())
}

/// Read one expression starting at byte `pos`.
/// Returns the expression and the position just past it, or None at EOF.
pub fn read_one_at(
    machine: &mut Machine,
    input: &str,
    pos: usize,
) -> LispResult<Option<(ValueRef, usize)>> {
    let mut reader = Reader::new(input, machine);
    reader.pos = pos;
    match reader.read()? {
        Some(val) => Ok(Some((val, reader.position()))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn read(src: &str) -> LispResult<String> {
        let mut m = Machine::new(Config::default())?;
        let mut reader = Reader::new(src, &mut m);
        let v = reader.read()?.unwrap_or(ValueRef::NIL);
        Ok(m.print(v))
    }

    #[test]
    fn reads_nested_lists() {
        assert_eq!(read("(42 43 nil hello)").unwrap(), "(42 43 nil hello)");
        assert_eq!(read("  ((1) (2 (3)))").unwrap(), "((1) (2 (3)))");
        assert_eq!(read("()").unwrap(), "nil");
    }

    #[test]
    fn reads_quote_prefixes() {
        assert_eq!(read("'a").unwrap(), "(quote a)");
        assert_eq!(read("`(1 #x)").unwrap(), "(quasiquote (1 (unquote x)))");
    }

    #[test]
    fn reads_marker_symbols_and_dotted_tails() {
        assert_eq!(read("(.\\ (a b) (f a .. b))").unwrap(), "(.\\ (a b) (f a .. b))");
        assert_eq!(read("(1 2 . 3)").unwrap(), "(1 2 . 3)");
    }

    #[test]
    fn strings_read_as_quoted_byte_lists() {
        assert_eq!(read("\"hi\"").unwrap(), "(quote (104 105))");
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(read("; leading\n(1 ; inner\n 2)").unwrap(), "(1 2)");
    }

    #[test]
    fn nesting_is_bounded_by_the_evaluation_limit() {
        let deep = format!("'{}{}", "(".repeat(50_000), ")".repeat(50_000));
        assert_eq!(read(&deep), Err(LispError::RecursionLimit { max: 2000 }));

        let nested = format!("{}{}", "(".repeat(1500), ")".repeat(1500));
        assert!(read(&nested).is_ok());
    }

    #[test]
    fn syntax_errors() {
        assert_eq!(read("(1 2"), Err(LispError::Syntax("unexpected end of input".into())));
        assert!(matches!(read(")"), Err(LispError::Syntax(_))));
        assert!(matches!(read("'"), Err(LispError::Syntax(_))));
        assert!(matches!(read("99999999999999999999"), Err(LispError::Syntax(_))));
        assert!(matches!(
            read("a-very-long-symbol-name"),
            Err(LispError::NameTooLong { max: 15, .. })
        ));
    }
}
