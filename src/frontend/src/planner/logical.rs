// Copyright 2026 rengine Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::HashSet;

use rengine_common::catalog::StreamDefinition;
use rengine_sqlparser::ast::{BinaryOperator, Expr, Field, Join, SortField, TableRef, WindowSpec};

/// A logical plan node: tagged variants with ordered children. DataSource
/// nodes are the leaves; there is exactly one root.
#[derive(Debug, Clone, PartialEq)]
pub enum LogicalPlan {
    DataSource {
        name: String,
        def: StreamDefinition,
        /// Predicate pushed all the way into the source (tables are filtered
        /// before being materialized).
        condition: Option<Expr>,
    },
    Window {
        spec: WindowSpec,
        children: Vec<LogicalPlan>,
    },
    /// Aligns table snapshots with the stream side of a join; one child per
    /// source, one of which is the (possibly windowed) stream.
    JoinAlign {
        table_emitters: Vec<String>,
        children: Vec<LogicalPlan>,
    },
    Join {
        from: TableRef,
        joins: Vec<Join>,
        children: Vec<LogicalPlan>,
    },
    Filter {
        condition: Expr,
        children: Vec<LogicalPlan>,
    },
    Aggregate {
        dimensions: Vec<Expr>,
        children: Vec<LogicalPlan>,
    },
    Having {
        condition: Expr,
        children: Vec<LogicalPlan>,
    },
    Order {
        sort_fields: Vec<SortField>,
        children: Vec<LogicalPlan>,
    },
    Project {
        fields: Vec<Field>,
        is_aggregate: bool,
        send_meta: bool,
        limit: Option<usize>,
        children: Vec<LogicalPlan>,
    },
}

impl LogicalPlan {
    pub fn children(&self) -> &[LogicalPlan] {
        match self {
            LogicalPlan::DataSource { .. } => &[],
            LogicalPlan::Window { children, .. }
            | LogicalPlan::JoinAlign { children, .. }
            | LogicalPlan::Join { children, .. }
            | LogicalPlan::Filter { children, .. }
            | LogicalPlan::Aggregate { children, .. }
            | LogicalPlan::Having { children, .. }
            | LogicalPlan::Order { children, .. }
            | LogicalPlan::Project { children, .. } => children,
        }
    }

    /// Source names reachable below this node.
    pub fn leaf_sources(&self) -> HashSet<String> {
        match self {
            LogicalPlan::DataSource { name, .. } => std::iter::once(name.clone()).collect(),
            other => other
                .children()
                .iter()
                .flat_map(LogicalPlan::leaf_sources)
                .collect(),
        }
    }

    /// Push `cond` as deep as it can go. Returns the residue that must stay
    /// above this node, and the rewritten node. Only conjunctive predicates
    /// split; a conjunct spanning two sources stops at the join.
    pub fn push_down_predicate(
        self,
        cond: Option<Expr>,
        default_source: &str,
    ) -> (Option<Expr>, LogicalPlan) {
        match self {
            LogicalPlan::DataSource {
                name,
                def,
                condition,
            } => {
                let mut mine = vec![];
                let mut rest = vec![];
                for conjunct in cond.map(conjuncts).unwrap_or_default() {
                    let sources = expr_sources(&conjunct, default_source);
                    if sources.iter().all(|s| s == &name) {
                        mine.push(conjunct);
                    } else {
                        rest.push(conjunct);
                    }
                }
                let condition = conjoin(condition.into_iter().chain(mine).collect());
                (
                    conjoin(rest),
                    LogicalPlan::DataSource {
                        name,
                        def,
                        condition,
                    },
                )
            }
            LogicalPlan::Filter {
                condition,
                children,
            } => {
                let combined = conjoin(cond.into_iter().chain(Some(condition)).collect());
                let (rest, children) =
                    push_into_children(children, combined, default_source, false);
                match rest {
                    // fully absorbed below: the filter node disappears
                    None => (None, only_child(children)),
                    Some(residual) => (
                        None,
                        LogicalPlan::Filter {
                            condition: residual,
                            children,
                        },
                    ),
                }
            }
            LogicalPlan::JoinAlign {
                table_emitters,
                children,
            } => {
                // tables first, then the windowed side
                let (rest, children) = push_into_children(children, cond, default_source, true);
                (
                    rest,
                    LogicalPlan::JoinAlign {
                        table_emitters,
                        children,
                    },
                )
            }
            LogicalPlan::Window { spec, children } => {
                let (rest, children) = push_into_children(children, cond, default_source, false);
                (rest, LogicalPlan::Window { spec, children })
            }
            LogicalPlan::Join {
                from,
                joins,
                children,
            } => {
                // a predicate spanning two sources stops at the join
                let mut single = vec![];
                let mut spanning = vec![];
                for conjunct in cond.map(conjuncts).unwrap_or_default() {
                    if expr_sources(&conjunct, default_source).len() <= 1 {
                        single.push(conjunct);
                    } else {
                        spanning.push(conjunct);
                    }
                }
                let (rest, children) =
                    push_into_children(children, conjoin(single), default_source, false);
                spanning.extend(rest.map(conjuncts).unwrap_or_default());
                (
                    conjoin(spanning),
                    LogicalPlan::Join {
                        from,
                        joins,
                        children,
                    },
                )
            }
            // single-child pass-through stages: the predicate may not cross
            // them (it would change grouped/ordered semantics), so it stays
            LogicalPlan::Aggregate { .. }
            | LogicalPlan::Having { .. }
            | LogicalPlan::Order { .. }
            | LogicalPlan::Project { .. } => (cond, self),
        }
    }
}

fn only_child(mut children: Vec<LogicalPlan>) -> LogicalPlan {
    assert_eq!(children.len(), 1, "filter has exactly one child");
    children.remove(0)
}

/// Distribute the conjuncts of `cond` over `children` by source coverage:
/// a conjunct descends into the first child whose leaves cover its sources;
/// anything unassignable is returned as residue. With `tables_first`, table
/// leaves (single DataSource children) absorb before the stream side.
fn push_into_children(
    children: Vec<LogicalPlan>,
    cond: Option<Expr>,
    default_source: &str,
    tables_first: bool,
) -> (Option<Expr>, Vec<LogicalPlan>) {
    let Some(cond) = cond else {
        return (None, children);
    };
    let mut assigned: Vec<Vec<Expr>> = children.iter().map(|_| vec![]).collect();
    let mut rest = vec![];
    for conjunct in conjuncts(cond) {
        let sources = expr_sources(&conjunct, default_source);
        let target = children
            .iter()
            .position(|c| sources.is_subset(&c.leaf_sources()));
        match target {
            Some(i) => assigned[i].push(conjunct),
            None => rest.push(conjunct),
        }
    }
    let order: Vec<usize> = {
        let mut idx: Vec<usize> = (0..children.len()).collect();
        if tables_first {
            idx.sort_by_key(|i| !matches!(children[*i], LogicalPlan::DataSource { .. }));
        }
        idx
    };
    let mut new_children: Vec<Option<LogicalPlan>> = children.into_iter().map(Some).collect();
    for i in order {
        let child = new_children[i].take().expect("child visited once");
        let (child_rest, child) =
            child.push_down_predicate(conjoin(assigned[i].drain(..).collect()), default_source);
        if let Some(r) = child_rest {
            rest.push(r);
        }
        new_children[i] = Some(child);
    }
    (
        conjoin(rest),
        new_children.into_iter().map(|c| c.expect("restored")).collect(),
    )
}

/// Split an expression on AND into its conjuncts.
pub fn conjuncts(expr: Expr) -> Vec<Expr> {
    match expr {
        Expr::BinaryOp {
            left,
            op: BinaryOperator::And,
            right,
        } => {
            let mut out = conjuncts(*left);
            out.extend(conjuncts(*right));
            out
        }
        other => vec![other],
    }
}

/// Re-join conjuncts with AND; `None` for the empty list.
pub fn conjoin(exprs: Vec<Expr>) -> Option<Expr> {
    exprs.into_iter().reduce(|acc, e| Expr::BinaryOp {
        left: Box::new(acc),
        op: BinaryOperator::And,
        right: Box::new(e),
    })
}

/// The set of source names an expression touches; unqualified references
/// belong to the statement's first source.
pub fn expr_sources(expr: &Expr, default_source: &str) -> HashSet<String> {
    expr.field_refs()
        .into_iter()
        .map(|(source, _)| source.unwrap_or(default_source).to_owned())
        .collect()
}

#[cfg(test)]
mod tests {
    use rengine_sqlparser::parse_select;

    use super::*;

    #[test]
    fn test_conjunct_split_and_join() {
        let cond = parse_select("SELECT * FROM t WHERE a > 1 AND b < 2 AND c = 3")
            .unwrap()
            .condition
            .unwrap();
        let parts = conjuncts(cond.clone());
        assert_eq!(parts.len(), 3);
        assert_eq!(conjoin(parts), Some(cond));
    }

    #[test]
    fn test_or_does_not_split() {
        let cond = parse_select("SELECT * FROM t WHERE a > 1 OR b < 2")
            .unwrap()
            .condition
            .unwrap();
        assert_eq!(conjuncts(cond).len(), 1);
    }

    #[test]
    fn test_expr_sources() {
        let cond = parse_select("SELECT * FROM demo WHERE demo.a > 1 AND b < 2 AND t1.c = 3")
            .unwrap()
            .condition
            .unwrap();
        let sources = expr_sources(&cond, "demo");
        assert_eq!(
            sources,
            ["demo".to_owned(), "t1".to_owned()].into_iter().collect()
        );
    }
}
