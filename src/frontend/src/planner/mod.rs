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

//! SQL → logical plan → optimized plan → physical topology.

pub mod logical;
pub mod optimizer;
pub mod physical;

use std::collections::HashMap;
use std::path::Path;

use rengine_common::catalog::StreamDefinition;
use rengine_common::rule::{Rule, RuleOptions};
use rengine_common::store::KvStore;
use rengine_expr::{has_agg_funcs, is_agg_statement};
use rengine_sqlparser::ast::{Expr, SelectStatement};
use rengine_stream::node::sink::{Sink, SinkConf};
use rengine_stream::node::source::Source;
use rengine_stream::registry::ConnectorRegistry;
use rengine_stream::Topology;
use tracing::info;

use self::logical::LogicalPlan;
use crate::{PlanError, PlanResult};

/// Plan a rule against the catalog into a ready-to-open topology.
pub fn plan(
    rule: &Rule,
    catalog: &KvStore,
    registry: &ConnectorRegistry,
    data_dir: &Path,
) -> PlanResult<Topology> {
    plan_with_sources_and_sinks(rule, catalog, registry, data_dir, vec![], vec![])
}

/// Like [`plan`], with predefined source/sink instances substituted by name.
/// The predefined path exists for tests and embedders; rules in production
/// resolve their connectors through the registry.
pub fn plan_with_sources_and_sinks(
    rule: &Rule,
    catalog: &KvStore,
    registry: &ConnectorRegistry,
    data_dir: &Path,
    sources: Vec<(String, Box<dyn Source>)>,
    sinks: Vec<(String, Box<dyn Sink>, SinkConf)>,
) -> PlanResult<Topology> {
    info!(rule = %rule.id, options = ?rule.options, "planning rule");
    let stmt = rengine_sqlparser::parse_select(&rule.sql)?;
    let stmt = resolve_aliases(stmt);
    let streams = stmt
        .stream_names()
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>();
    if !sources.is_empty() && sources.len() != streams.len() {
        return Err(PlanError::Validation(format!(
            "invalid parameter sources, the length cannot match the statement, expect {} sources",
            streams.len()
        )));
    }
    let plan = create_logical_plan(&stmt, &rule.options, catalog)?;
    let plan = optimizer::optimize(plan, &streams[0]);
    physical::create_topology(rule, plan, registry, data_dir, sources, sinks)
}

/// Rewrite source aliases to the underlying stream names so the runtime only
/// ever sees emitter names.
fn resolve_aliases(mut stmt: SelectStatement) -> SelectStatement {
    let mut aliases: HashMap<String, String> = HashMap::new();
    for s in &stmt.sources {
        if let Some(alias) = &s.alias {
            aliases.insert(alias.clone(), s.name.clone());
        }
    }
    for j in &stmt.joins {
        if let Some(alias) = &j.table.alias {
            aliases.insert(alias.clone(), j.table.name.clone());
        }
    }
    if aliases.is_empty() {
        return stmt;
    }
    let rewrite = |expr: &mut Expr| rewrite_sources(expr, &aliases);
    for f in &mut stmt.fields {
        rewrite(&mut f.expr);
    }
    if let Some(c) = &mut stmt.condition {
        rewrite(c);
    }
    for d in &mut stmt.dimensions {
        rewrite(d);
    }
    if let Some(w) = &mut stmt.window {
        if let Some(f) = &mut w.filter {
            rewrite(f);
        }
    }
    if let Some(h) = &mut stmt.having {
        rewrite(h);
    }
    for j in &mut stmt.joins {
        if let Some(on) = &mut j.on {
            rewrite(on);
        }
    }
    for sf in &mut stmt.sort_fields {
        let actual = sf.source.as_ref().and_then(|s| aliases.get(s)).cloned();
        if actual.is_some() {
            sf.source = actual;
        }
    }
    stmt
}

fn rewrite_sources(expr: &mut Expr, aliases: &HashMap<String, String>) {
    match expr {
        Expr::FieldRef {
            source: Some(src), ..
        } => {
            if let Some(actual) = aliases.get(src) {
                *src = actual.clone();
            }
        }
        Expr::UnaryOp { expr, .. } => rewrite_sources(expr, aliases),
        Expr::BinaryOp { left, right, .. } => {
            rewrite_sources(left, aliases);
            rewrite_sources(right, aliases);
        }
        Expr::Function { args, .. } => {
            for a in args {
                rewrite_sources(a, aliases);
            }
        }
        Expr::Case {
            when_clauses,
            else_clause,
        } => {
            for (w, t) in when_clauses {
                rewrite_sources(w, aliases);
                rewrite_sources(t, aliases);
            }
            if let Some(e) = else_clause {
                rewrite_sources(e, aliases);
            }
        }
        Expr::Literal(_) | Expr::FieldRef { source: None, .. } | Expr::Wildcard => {}
    }
}

/// Build the canonical logical stack bottom-up: DataSource* → Window →
/// JoinAlign → Join → Filter → Aggregate → Having → Order → Project.
/// Optional stages are simply absent.
pub fn create_logical_plan(
    stmt: &SelectStatement,
    options: &RuleOptions,
    catalog: &KvStore,
) -> PlanResult<LogicalPlan> {
    let streams = stmt.stream_names();
    validate_options(stmt, options, &streams)?;
    validate_aliases(stmt)?;

    let mut defs: Vec<StreamDefinition> = vec![];
    for name in &streams {
        let def: Option<StreamDefinition> = catalog.get(name)?;
        defs.push(def.ok_or_else(|| PlanError::StreamNotFound((*name).to_string()))?);
    }
    validate_fields(stmt, &defs)?;

    if stmt.window.is_some() && defs[0].is_table() {
        return Err(PlanError::Validation(format!(
            "window can not be applied to table {}",
            defs[0].name
        )));
    }
    let has_table = defs.iter().any(StreamDefinition::is_table);
    if !stmt.joins.is_empty() && stmt.window.is_none() && !has_table {
        return Err(PlanError::Validation(
            "a window is required to join multiple streams".into(),
        ));
    }

    // leaves
    let mut stream_children: Vec<LogicalPlan> = vec![];
    let mut table_children: Vec<LogicalPlan> = vec![];
    let mut table_emitters: Vec<String> = vec![];
    for def in defs {
        let is_table = def.is_table();
        let name = def.name.clone();
        let node = LogicalPlan::DataSource {
            name: name.clone(),
            condition: None,
            def,
        };
        if is_table {
            table_emitters.push(name);
            table_children.push(node);
        } else {
            stream_children.push(node);
        }
    }

    let mut children = stream_children;
    if let Some(spec) = &stmt.window {
        children = vec![LogicalPlan::Window {
            spec: spec.clone(),
            children,
        }];
    }
    if !table_children.is_empty() && !stmt.joins.is_empty() {
        children.extend(table_children);
        children = vec![LogicalPlan::JoinAlign {
            table_emitters,
            children,
        }];
    }
    if !stmt.joins.is_empty() {
        children = vec![LogicalPlan::Join {
            from: stmt.sources[0].clone(),
            joins: stmt.joins.clone(),
            children,
        }];
    }
    if let Some(cond) = &stmt.condition {
        children = vec![LogicalPlan::Filter {
            condition: cond.clone(),
            children,
        }];
    }
    let aggregate_alias: Vec<_> = stmt
        .fields
        .iter()
        .filter(|f| f.alias.is_some() && has_agg_funcs(&f.expr))
        .collect();
    if !stmt.dimensions.is_empty() || !aggregate_alias.is_empty() {
        children = vec![LogicalPlan::Aggregate {
            dimensions: stmt.dimensions.clone(),
            children,
        }];
    }
    if let Some(cond) = &stmt.having {
        children = vec![LogicalPlan::Having {
            condition: cond.clone(),
            children,
        }];
    }
    if !stmt.sort_fields.is_empty() {
        children = vec![LogicalPlan::Order {
            sort_fields: stmt.sort_fields.clone(),
            children,
        }];
    }
    Ok(LogicalPlan::Project {
        fields: stmt.fields.clone(),
        is_aggregate: is_agg_statement(stmt),
        send_meta: options.send_meta_to_sink,
        limit: stmt.limit,
        children,
    })
}

fn validate_options(
    stmt: &SelectStatement,
    options: &RuleOptions,
    streams: &[&str],
) -> PlanResult<()> {
    if options.send_meta_to_sink && (streams.len() > 1 || stmt.window.is_some()) {
        return Err(PlanError::Validation(
            "invalid option sendMetaToSink, it can not be applied to window".into(),
        ));
    }
    Ok(())
}

/// The same alias naming both an aggregate and a non-aggregate expression is
/// ambiguous at projection time.
fn validate_aliases(stmt: &SelectStatement) -> PlanResult<()> {
    let mut agg: Vec<&str> = vec![];
    let mut plain: Vec<&str> = vec![];
    for f in &stmt.fields {
        if let Some(alias) = &f.alias {
            if has_agg_funcs(&f.expr) {
                agg.push(alias);
            } else {
                plain.push(alias);
            }
        }
    }
    for a in &agg {
        if plain.contains(a) {
            return Err(PlanError::Validation(format!(
                "duplicate alias {a} names both an aggregate and a non-aggregate expression"
            )));
        }
    }
    Ok(())
}

/// With a declared schema, referencing an undeclared field is a planning
/// error. Schemaless sources defer everything to evaluation time.
fn validate_fields(stmt: &SelectStatement, defs: &[StreamDefinition]) -> PlanResult<()> {
    let find_def = |name: &str| defs.iter().find(|d| d.name == name);
    let check = |expr: &Expr| -> PlanResult<()> {
        for (source, field) in expr.field_refs() {
            match source {
                Some(src) => {
                    if let Some(def) = find_def(src) {
                        if !def.fields.is_empty() && def.field(field).is_none() {
                            return Err(PlanError::Validation(format!(
                                "unknown field {src}.{field}"
                            )));
                        }
                    }
                }
                None => {
                    let all_schemed = defs.iter().all(|d| !d.fields.is_empty());
                    if all_schemed && !defs.iter().any(|d| d.field(field).is_some()) {
                        return Err(PlanError::Validation(format!("unknown field {field}")));
                    }
                }
            }
        }
        Ok(())
    };
    for f in &stmt.fields {
        check(&f.expr)?;
    }
    if let Some(c) = &stmt.condition {
        check(c)?;
    }
    for d in &stmt.dimensions {
        check(d)?;
    }
    if let Some(h) = &stmt.having {
        check(h)?;
    }
    for j in &stmt.joins {
        if let Some(on) = &j.on {
            check(on)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use rengine_common::catalog::{FieldType, StreamField, StreamKind, StreamOptions};
    use rengine_sqlparser::parse_select;

    use super::*;

    fn catalog_with(defs: &[StreamDefinition]) -> (tempfile::TempDir, KvStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = KvStore::open(dir.path().join("stream")).unwrap();
        for def in defs {
            store.put(&def.name, def).unwrap();
        }
        (dir, store)
    }

    fn demo() -> StreamDefinition {
        StreamDefinition {
            name: "demo".into(),
            kind: StreamKind::Stream,
            fields: vec![
                StreamField {
                    name: "color".into(),
                    ftype: FieldType::String,
                },
                StreamField {
                    name: "size".into(),
                    ftype: FieldType::Bigint,
                },
                StreamField {
                    name: "ts".into(),
                    ftype: FieldType::Bigint,
                },
            ],
            options: StreamOptions::default(),
        }
    }

    fn table1() -> StreamDefinition {
        StreamDefinition {
            name: "table1".into(),
            kind: StreamKind::Table,
            fields: vec![
                StreamField {
                    name: "id".into(),
                    ftype: FieldType::Bigint,
                },
                StreamField {
                    name: "name".into(),
                    ftype: FieldType::String,
                },
            ],
            options: StreamOptions::default(),
        }
    }

    fn plan_sql(sql: &str, defs: &[StreamDefinition]) -> PlanResult<LogicalPlan> {
        let (_dir, store) = catalog_with(defs);
        let stmt = parse_select(sql).unwrap();
        create_logical_plan(&stmt, &RuleOptions::default(), &store)
    }

    #[test]
    fn test_canonical_stack_order() {
        let plan = plan_sql(
            "SELECT color, count(*) as c FROM demo WHERE size > 1 \
             GROUP BY color, TUMBLINGWINDOW(ss, 10) HAVING count(*) > 0 ORDER BY color",
            &[demo()],
        )
        .unwrap();
        // Project → Order → Having → Aggregate → Filter → Window → DataSource
        let LogicalPlan::Project { children, .. } = &plan else {
            panic!("root must be project")
        };
        let LogicalPlan::Order { children, .. } = &children[0] else {
            panic!("then order")
        };
        let LogicalPlan::Having { children, .. } = &children[0] else {
            panic!("then having")
        };
        let LogicalPlan::Aggregate { children, .. } = &children[0] else {
            panic!("then aggregate")
        };
        let LogicalPlan::Filter { children, .. } = &children[0] else {
            panic!("then filter")
        };
        let LogicalPlan::Window { children, .. } = &children[0] else {
            panic!("then window")
        };
        assert!(matches!(children[0], LogicalPlan::DataSource { .. }));
    }

    #[test]
    fn test_join_align_wraps_table_join() {
        let plan = plan_sql(
            "SELECT * FROM demo INNER JOIN table1 ON demo.ts = table1.id",
            &[demo(), table1()],
        )
        .unwrap();
        let LogicalPlan::Project { children, .. } = &plan else {
            panic!("root must be project")
        };
        let LogicalPlan::Join { children, .. } = &children[0] else {
            panic!("then join")
        };
        let LogicalPlan::JoinAlign {
            table_emitters,
            children,
        } = &children[0]
        else {
            panic!("then join align")
        };
        assert_eq!(table_emitters, &["table1".to_owned()]);
        assert_eq!(children.len(), 2);
    }

    #[test]
    fn test_missing_stream_is_fatal() {
        let err = plan_sql("SELECT * FROM nope", &[demo()]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "fail to get stream nope, please check if stream is created"
        );
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = plan_sql("SELECT nope FROM demo", &[demo()]).unwrap_err();
        assert!(err.to_string().contains("unknown field nope"));
    }

    #[test]
    fn test_window_on_table_rejected() {
        let err = plan_sql(
            "SELECT * FROM table1 GROUP BY TUMBLINGWINDOW(ss, 10)",
            &[table1()],
        )
        .unwrap_err();
        assert!(err.to_string().contains("window can not be applied to table"));
    }

    #[test]
    fn test_stream_join_requires_window() {
        let demo1 = StreamDefinition {
            name: "demo1".into(),
            ..demo()
        };
        let err = plan_sql(
            "SELECT * FROM demo INNER JOIN demo1 ON demo.ts = demo1.ts",
            &[demo(), demo1],
        )
        .unwrap_err();
        assert!(err.to_string().contains("window is required"));
    }

    #[test]
    fn test_send_meta_conflicts_with_window() {
        let (_dir, store) = catalog_with(&[demo()]);
        let stmt = parse_select("SELECT * FROM demo GROUP BY TUMBLINGWINDOW(ss, 10)").unwrap();
        let options = RuleOptions {
            send_meta_to_sink: true,
            ..Default::default()
        };
        let err = create_logical_plan(&stmt, &options, &store).unwrap_err();
        assert!(err.to_string().contains("sendMetaToSink"));
    }

    #[test]
    fn test_duplicate_agg_alias_rejected() {
        let err = plan_sql(
            "SELECT count(*) as x, size as x FROM demo GROUP BY size",
            &[demo()],
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate alias x"));
    }

    #[test]
    fn test_predicate_pushdown_into_table_source() {
        let plan = plan_sql(
            "SELECT * FROM demo INNER JOIN table1 ON demo.ts = table1.id \
             WHERE table1.name = 'a' AND demo.size > 1 AND demo.size > table1.id",
            &[demo(), table1()],
        )
        .unwrap();
        let plan = optimizer::optimize(plan, "demo");
        // the cross-source conjunct survives as a filter above the join
        let LogicalPlan::Project { children, .. } = &plan else {
            panic!("root must be project")
        };
        let LogicalPlan::Filter {
            condition,
            children,
        } = &children[0]
        else {
            panic!("expected residual filter, got {:?}", children[0])
        };
        assert_eq!(logical::conjuncts(condition.clone()).len(), 1);
        let LogicalPlan::Join { children, .. } = &children[0] else {
            panic!("then join")
        };
        let LogicalPlan::JoinAlign { children, .. } = &children[0] else {
            panic!("then align")
        };
        // single-source conjuncts landed on their data sources
        for child in children {
            let LogicalPlan::DataSource {
                name, condition, ..
            } = child
            else {
                panic!("align children are sources")
            };
            assert!(
                condition.is_some(),
                "source {name} should have absorbed its predicate"
            );
        }
    }
}
