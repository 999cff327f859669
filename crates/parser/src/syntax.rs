use std::ops::Range;

use pest::iterators::{Pair, Pairs};

#[derive(pest_derive::Parser)]
#[grammar = "ember.pest"]
pub struct Parser;

/// A byte range of the parsed input.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct Span(pub u32, pub u32);

impl Span {
    pub fn from_range(r: Range<usize>) -> Self {
        Self(r.start as u32, r.end as u32)
    }

    pub fn as_range(&self) -> Range<usize> {
        self.0 as usize..self.1 as usize
    }
}

#[derive(Debug, Clone)]
pub struct Spanned<T> {
    pub span: Span,
    pub inner: T,
}

impl<T> AsRef<T> for Spanned<T> {
    fn as_ref(&self) -> &T {
        &self.inner
    }
}

impl<T, E> FromSyntax<E> for Spanned<T>
where
    T: FromSyntax<E>,
{
    fn from_syntax(node: &mut Node<E>) -> Self {
        let span = node.span;
        Self {
            span,
            inner: T::from_syntax(node),
        }
    }
}

pub trait FromSyntax<E> {
    fn from_syntax(node: &mut Node<E>) -> Self;
}

/// A cursor over the children of one parse tree node.
///
/// Children are consumed as they are converted, so a rule that occurs more
/// than once among the children is read front to back by repeated calls.
/// Errors raised while converting a child are collected into its parent.
pub struct Node<'i, E> {
    pub rule: Rule,
    pub txt: &'i str,
    pub span: Span,
    pairs: Vec<Pair<'i, Rule>>,
    pub errors: Vec<E>,
}

impl<'i, E> Node<'i, E> {
    pub fn new(pair: Pair<'i, Rule>) -> Self {
        let span = pair.as_span();
        Self {
            rule: pair.as_rule(),
            txt: pair.as_str(),
            span: Span::from_range(span.start()..span.end()),
            pairs: pair.into_inner().collect(),
            errors: Vec::new(),
        }
    }

    /// Wraps the top-level pairs of a successful parse.
    pub fn root(rule: Rule, input: &'i str, pairs: Pairs<'i, Rule>) -> Self {
        Self {
            rule,
            txt: input,
            span: Span::from_range(0..input.len()),
            pairs: pairs.collect(),
            errors: Vec::new(),
        }
    }

    pub fn error(&mut self, err: E) {
        self.errors.push(err);
    }

    /// The rule of the next unconsumed child.
    pub fn peek_rule(&self) -> Option<Rule> {
        self.pairs.first().map(Pair::as_rule)
    }

    /// Replaces this node with its only child.
    pub fn descend(&mut self) {
        debug_assert_eq!(self.pairs.len(), 1, "{:?} has more than one child", self.rule);
        let pair = self.pairs.remove(0);
        let errors = std::mem::take(&mut self.errors);
        *self = Self::new(pair);
        self.errors = errors;
    }

    /// Consumes a child matching `rule`, reporting whether there was one.
    pub fn eat(&mut self, rule: Rule) -> bool {
        self.get_opt(rule).is_some()
    }

    pub fn single<T: FromSyntax<E>>(&mut self, rule: Rule) -> T {
        let pair = self.get(rule);
        self.visit(pair, T::from_syntax)
    }

    pub fn single_opt<T: FromSyntax<E>>(&mut self, rule: Rule) -> Option<T> {
        let pair = self.get_opt(rule)?;
        Some(self.visit(pair, T::from_syntax))
    }

    pub fn multi<T: FromSyntax<E>>(&mut self, rule: Rule) -> Vec<T> {
        let (taken, rest) = std::mem::take(&mut self.pairs)
            .into_iter()
            .partition::<Vec<_>, _>(|pair| pair.as_rule() == rule);
        self.pairs = rest;
        taken
            .into_iter()
            .map(|pair| self.visit(pair, T::from_syntax))
            .collect()
    }

    pub fn descend_into<T>(&mut self, rule: Rule, f: impl FnOnce(&mut Self) -> T) -> T {
        let pair = self.get(rule);
        self.visit(pair, f)
    }

    pub fn descend_into_opt<T>(&mut self, rule: Rule, f: impl FnOnce(&mut Self) -> T) -> Option<T> {
        let pair = self.get_opt(rule)?;
        Some(self.visit(pair, f))
    }

    fn visit<T>(&mut self, pair: Pair<'i, Rule>, f: impl FnOnce(&mut Self) -> T) -> T {
        let mut child = Self::new(pair);
        let result = f(&mut child);
        self.errors.append(&mut child.errors);
        result
    }

    /// # Panics
    /// Panics if no child matches `rule`; the grammar guarantees the
    /// children every caller asks for.
    pub fn get(&mut self, rule: Rule) -> Pair<'i, Rule> {
        match self.get_opt(rule) {
            Some(pair) => pair,
            None => panic!(
                "no {rule:?} inside {:?}, remaining children: {:?}",
                self.rule, self.pairs
            ),
        }
    }

    pub fn get_opt(&mut self, rule: Rule) -> Option<Pair<'i, Rule>> {
        let pos = self.pairs.iter().position(|pair| pair.as_rule() == rule)?;
        Some(self.pairs.remove(pos))
    }
}
