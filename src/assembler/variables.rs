//! Static discovery of the variables a template expects from its caller.

use std::collections::{BTreeSet, HashSet};
use tera::ast::{Expr, ExprVal, Node};
use tera::Tera;

use super::error::TemplateSyntaxError;

const PARSE_NAME: &str = "__variables__";

/// Names referenced by the template that nothing inside it binds.
///
/// Loop targets, `set` assignments and the implicit `loop` object are bound.
/// Only the root of a dotted path is reported. Expressions guarded by a
/// `default` filter and subjects of `defined`/`undefined` tests are optional
/// and not reported.
pub fn extract(template_text: &str) -> Result<BTreeSet<String>, TemplateSyntaxError> {
    let mut tera = Tera::default();
    tera.add_raw_template(PARSE_NAME, template_text)
        .map_err(|e| TemplateSyntaxError(error_chain(&e)))?;
    let template = tera
        .get_template(PARSE_NAME)
        .map_err(|e| TemplateSyntaxError(error_chain(&e)))?;

    let mut walker = Walker::default();
    let mut scope = HashSet::new();
    walker.nodes(&template.ast, &mut scope);
    Ok(walker.found)
}

/// Flatten a tera error and its sources into one line
pub(crate) fn error_chain(err: &tera::Error) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}

#[derive(Default)]
struct Walker {
    found: BTreeSet<String>,
}

impl Walker {
    fn nodes(&mut self, nodes: &[Node], scope: &mut HashSet<String>) {
        for node in nodes {
            self.node(node, scope);
        }
    }

    fn node(&mut self, node: &Node, scope: &mut HashSet<String>) {
        match node {
            Node::VariableBlock(_, expr) => self.expr(expr, scope),
            Node::Set(_, set) => {
                self.expr(&set.value, scope);
                scope.insert(set.key.clone());
            }
            Node::Forloop(_, forloop, _) => {
                self.expr(&forloop.container, scope);
                let mut inner = scope.clone();
                inner.insert(forloop.value.clone());
                inner.insert("loop".to_string());
                if let Some(key) = &forloop.key {
                    inner.insert(key.clone());
                }
                self.nodes(&forloop.body, &mut inner);
                if let Some(empty_body) = &forloop.empty_body {
                    self.nodes(empty_body, &mut scope.clone());
                }
            }
            Node::If(if_node, _) => {
                for (_, condition, body) in &if_node.conditions {
                    self.expr(condition, scope);
                    self.nodes(body, &mut scope.clone());
                }
                if let Some((_, body)) = &if_node.otherwise {
                    self.nodes(body, &mut scope.clone());
                }
            }
            Node::Block(_, block, _) => self.nodes(&block.body, scope),
            Node::FilterSection(_, section, _) => {
                for arg in section.filter.args.values() {
                    self.expr(arg, scope);
                }
                self.nodes(&section.body, &mut scope.clone());
            }
            // macros only see their own arguments; raw, text, comments,
            // includes and inheritance carry no caller variables
            _ => {}
        }
    }

    fn expr(&mut self, expr: &Expr, scope: &HashSet<String>) {
        // tera only tolerates an undefined value when `default` comes first
        let optional = expr.filters.first().map_or(false, |f| f.name == "default");
        self.expr_val(&expr.val, scope, optional);
        for filter in &expr.filters {
            for arg in filter.args.values() {
                self.expr(arg, scope);
            }
        }
    }

    fn expr_val(&mut self, val: &ExprVal, scope: &HashSet<String>, optional: bool) {
        match val {
            ExprVal::Ident(ident) => {
                if !optional {
                    self.ident(ident, scope);
                }
            }
            ExprVal::Math(math) => {
                self.expr(&math.lhs, scope);
                self.expr(&math.rhs, scope);
            }
            ExprVal::Logic(logic) => {
                self.expr(&logic.lhs, scope);
                self.expr(&logic.rhs, scope);
            }
            ExprVal::Test(test) => {
                if test.name != "defined" && test.name != "undefined" {
                    self.ident(&test.ident, scope);
                }
                for arg in &test.args {
                    self.expr(arg, scope);
                }
            }
            ExprVal::FunctionCall(call) => {
                for arg in call.args.values() {
                    self.expr(arg, scope);
                }
            }
            ExprVal::MacroCall(call) => {
                for arg in call.args.values() {
                    self.expr(arg, scope);
                }
            }
            ExprVal::Array(items) => {
                for item in items {
                    self.expr(item, scope);
                }
            }
            ExprVal::StringConcat(concat) => {
                for value in &concat.values {
                    self.expr_val(value, scope, optional);
                }
            }
            ExprVal::In(in_expr) => {
                self.expr(&in_expr.lhs, scope);
                self.expr(&in_expr.rhs, scope);
            }
            _ => {}
        }
    }

    fn ident(&mut self, ident: &str, scope: &HashSet<String>) {
        let root = root_name(ident);
        if root.is_empty() || root.starts_with("__tera") || scope.contains(root) {
            return;
        }
        self.found.insert(root.to_string());
    }
}

/// `interfaces[0].name` -> `interfaces`
fn root_name(ident: &str) -> &str {
    ident
        .split(|c| c == '.' || c == '[')
        .next()
        .unwrap_or("")
        .trim()
}
