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

//! Walks the optimized logical tree bottom-up and emits the operator graph:
//! one source per stream, a preprocessor (or table processor) behind it, one
//! transform per logical node, and the sink nodes at the root. Operator names
//! are index-prefixed in build order; the index is part of the metric
//! contract.

use std::collections::HashMap;
use std::path::Path;

use rengine_common::rule::{Rule, RuleOptions};
use rengine_stream::node::sink::{Sink, SinkConf, SinkNode};
use rengine_stream::node::source::{Source, SourceNode};
use rengine_stream::node::transform::UnaryOperatorNode;
use rengine_stream::node::window::{WindowConfig, WindowOperatorNode};
use rengine_stream::node::OperatorNode;
use rengine_stream::operator::{
    AggregateOp, FilterOp, HavingOp, JoinAlignOp, JoinOp, Operation, OrderOp, Preprocessor,
    ProjectOp, TableProcessor,
};
use rengine_stream::registry::ConnectorRegistry;
use rengine_stream::Topology;

use super::logical::LogicalPlan;
use crate::PlanResult;

/// Workers per operator. A worker pool pulls from one shared channel and
/// emits independently, so cross-worker output order — including the
/// position of checkpoint barriers relative to the data they follow — is
/// not preserved. Checkpointing rules therefore run every operator with a
/// single worker; without barriers the rule's `concurrency` applies.
fn worker_concurrency(options: &RuleOptions) -> usize {
    if options.checkpoint_enabled() {
        1
    } else {
        options.concurrency
    }
}

pub fn create_topology(
    rule: &Rule,
    plan: LogicalPlan,
    registry: &ConnectorRegistry,
    data_dir: &Path,
    sources: Vec<(String, Box<dyn Source>)>,
    sinks: Vec<(String, Box<dyn Sink>, SinkConf)>,
) -> PlanResult<Topology> {
    let options = &rule.options;
    let mut tp = Topology::new(&rule.id, options.clone())
        .with_checkpoint_dir(data_dir.join("checkpoints").join(&rule.id));
    let mut overrides: HashMap<String, Box<dyn Source>> = sources.into_iter().collect();
    let mut index = 0usize;
    let root = build_ops(plan, &mut tp, options, registry, &mut overrides, &mut index)?;

    if !sinks.is_empty() {
        // predefined sinks, the test path
        for (i, (name, sink, conf)) in sinks.into_iter().enumerate() {
            tp.add_sink(
                &[root.as_str()],
                SinkNode::new(name, i, sink, conf, options.buffer_length),
            )?;
        }
    } else {
        for (i, action) in rule.actions.iter().enumerate() {
            for (name, props) in action {
                let sink = registry.create_sink(name, props)?;
                let conf = SinkConf::from_props(props);
                tp.add_sink(
                    &[root.as_str()],
                    SinkNode::new(name.clone(), i, sink, conf, options.buffer_length),
                )?;
            }
        }
    }
    Ok(tp)
}

fn build_ops(
    plan: LogicalPlan,
    tp: &mut Topology,
    options: &RuleOptions,
    registry: &ConnectorRegistry,
    overrides: &mut HashMap<String, Box<dyn Source>>,
    index: &mut usize,
) -> PlanResult<String> {
    match plan {
        LogicalPlan::DataSource {
            name,
            def,
            condition,
        } => {
            let source = match overrides.remove(&name) {
                Some(s) => s,
                None => registry.create_source(&def)?,
            };
            tp.add_source(SourceNode::new(&name, source, options.buffer_length));
            *index += 1;
            let (op_name, kernel, concurrency): (String, Box<dyn Operation>, usize) =
                if def.is_table() {
                    (
                        format!("{index}_tableprocessor_{name}"),
                        Box::new(TableProcessor::new(&def, options)),
                        1,
                    )
                } else {
                    (
                        format!("{index}_preprocessor_{name}"),
                        Box::new(Preprocessor::new(&def, options)),
                        worker_concurrency(options),
                    )
                };
            add_unary(tp, &[name.as_str()], &op_name, kernel, concurrency, options)?;
            let mut emitter = op_name;
            if let Some(condition) = condition {
                // predicate pushed into the source filters right behind it
                *index += 1;
                let filter_name = format!("{index}_filter");
                add_unary(
                    tp,
                    &[emitter.as_str()],
                    &filter_name,
                    Box::new(FilterOp { condition }),
                    worker_concurrency(options),
                    options,
                )?;
                emitter = filter_name;
            }
            Ok(emitter)
        }
        LogicalPlan::Window { spec, children } => {
            let mut inputs = build_children(children, tp, options, registry, overrides, index)?;
            if let Some(condition) = spec.filter.clone() {
                *index += 1;
                let name = format!("{index}_window_filter");
                add_unary(
                    tp,
                    &as_refs(&inputs),
                    &name,
                    Box::new(FilterOp { condition }),
                    worker_concurrency(options),
                    options,
                )?;
                inputs = vec![name];
            }
            *index += 1;
            let name = format!("{index}_window");
            let node = WindowOperatorNode::new(
                &name,
                WindowConfig {
                    wtype: spec.wtype,
                    length: spec.length,
                    interval: spec.interval,
                    is_event_time: options.is_event_time,
                    late_tol: options.late_tol,
                },
                options.buffer_length,
            );
            tp.add_operator(&as_refs(&inputs), OperatorNode::Window(node))?;
            Ok(name)
        }
        LogicalPlan::JoinAlign {
            table_emitters,
            children,
        } => {
            let inputs = build_children(children, tp, options, registry, overrides, index)?;
            *index += 1;
            let name = format!("{index}_join_aligner");
            add_unary(
                tp,
                &as_refs(&inputs),
                &name,
                Box::new(JoinAlignOp::new(table_emitters)),
                1,
                options,
            )?;
            Ok(name)
        }
        LogicalPlan::Join {
            from,
            joins,
            children,
        } => {
            let inputs = build_children(children, tp, options, registry, overrides, index)?;
            *index += 1;
            let name = format!("{index}_join");
            add_unary(
                tp,
                &as_refs(&inputs),
                &name,
                Box::new(JoinOp {
                    from_name: from.name,
                    joins,
                }),
                worker_concurrency(options),
                options,
            )?;
            Ok(name)
        }
        LogicalPlan::Filter {
            condition,
            children,
        } => {
            let inputs = build_children(children, tp, options, registry, overrides, index)?;
            *index += 1;
            let name = format!("{index}_filter");
            add_unary(
                tp,
                &as_refs(&inputs),
                &name,
                Box::new(FilterOp { condition }),
                worker_concurrency(options),
                options,
            )?;
            Ok(name)
        }
        LogicalPlan::Aggregate {
            dimensions,
            children,
        } => {
            let inputs = build_children(children, tp, options, registry, overrides, index)?;
            *index += 1;
            let name = format!("{index}_aggregate");
            add_unary(
                tp,
                &as_refs(&inputs),
                &name,
                Box::new(AggregateOp { dimensions }),
                1,
                options,
            )?;
            Ok(name)
        }
        LogicalPlan::Having {
            condition,
            children,
        } => {
            let inputs = build_children(children, tp, options, registry, overrides, index)?;
            *index += 1;
            let name = format!("{index}_having");
            add_unary(
                tp,
                &as_refs(&inputs),
                &name,
                Box::new(HavingOp { condition }),
                worker_concurrency(options),
                options,
            )?;
            Ok(name)
        }
        LogicalPlan::Order {
            sort_fields,
            children,
        } => {
            let inputs = build_children(children, tp, options, registry, overrides, index)?;
            *index += 1;
            let name = format!("{index}_order");
            add_unary(
                tp,
                &as_refs(&inputs),
                &name,
                Box::new(OrderOp { sort_fields }),
                1,
                options,
            )?;
            Ok(name)
        }
        LogicalPlan::Project {
            fields,
            is_aggregate,
            send_meta,
            limit,
            children,
        } => {
            let inputs = build_children(children, tp, options, registry, overrides, index)?;
            *index += 1;
            let name = format!("{index}_project");
            add_unary(
                tp,
                &as_refs(&inputs),
                &name,
                Box::new(ProjectOp {
                    fields,
                    is_aggregate,
                    send_meta,
                    limit,
                }),
                worker_concurrency(options),
                options,
            )?;
            Ok(name)
        }
    }
}

fn build_children(
    children: Vec<LogicalPlan>,
    tp: &mut Topology,
    options: &RuleOptions,
    registry: &ConnectorRegistry,
    overrides: &mut HashMap<String, Box<dyn Source>>,
    index: &mut usize,
) -> PlanResult<Vec<String>> {
    children
        .into_iter()
        .map(|c| build_ops(c, tp, options, registry, overrides, index))
        .collect()
}

fn add_unary(
    tp: &mut Topology,
    inputs: &[&str],
    name: &str,
    kernel: Box<dyn Operation>,
    concurrency: usize,
    options: &RuleOptions,
) -> PlanResult<()> {
    let node = UnaryOperatorNode::new(name, kernel, concurrency, options.buffer_length);
    tp.add_operator(inputs, OperatorNode::Unary(node))?;
    Ok(())
}

fn as_refs(names: &[String]) -> Vec<&str> {
    names.iter().map(String::as_str).collect()
}
