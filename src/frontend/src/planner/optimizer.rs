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

use super::logical::LogicalPlan;

/// Rewrite the logical tree. The one mandatory rule is predicate push-down:
/// filter conditions referencing a single source descend to that source —
/// through a join-align, tables absorb before the windowed side. Rewrites
/// preserve semantics; there is no cost model.
pub fn optimize(plan: LogicalPlan, default_source: &str) -> LogicalPlan {
    predicate_push_down(plan, default_source)
}

fn predicate_push_down(plan: LogicalPlan, default_source: &str) -> LogicalPlan {
    match plan {
        LogicalPlan::Filter {
            condition,
            children,
        } => {
            let children: Vec<LogicalPlan> = children
                .into_iter()
                .map(|c| predicate_push_down(c, default_source))
                .collect();
            let (rest, node) = LogicalPlan::Filter {
                condition,
                children,
            }
            .push_down_predicate(None, default_source);
            debug_assert!(rest.is_none(), "filter absorbs its own condition");
            node
        }
        LogicalPlan::DataSource { .. } => plan,
        other => map_children(other, |c| predicate_push_down(c, default_source)),
    }
}

fn map_children(plan: LogicalPlan, f: impl Fn(LogicalPlan) -> LogicalPlan) -> LogicalPlan {
    use LogicalPlan::*;
    let rebuild = |children: Vec<LogicalPlan>| children.into_iter().map(&f).collect();
    match plan {
        Window { spec, children } => Window {
            spec,
            children: rebuild(children),
        },
        JoinAlign {
            table_emitters,
            children,
        } => JoinAlign {
            table_emitters,
            children: rebuild(children),
        },
        Join {
            from,
            joins,
            children,
        } => Join {
            from,
            joins,
            children: rebuild(children),
        },
        Filter {
            condition,
            children,
        } => Filter {
            condition,
            children: rebuild(children),
        },
        Aggregate {
            dimensions,
            children,
        } => Aggregate {
            dimensions,
            children: rebuild(children),
        },
        Having {
            condition,
            children,
        } => Having {
            condition,
            children: rebuild(children),
        },
        Order {
            sort_fields,
            children,
        } => Order {
            sort_fields,
            children: rebuild(children),
        },
        Project {
            fields,
            is_aggregate,
            send_meta,
            limit,
            children,
        } => Project {
            fields,
            is_aggregate,
            send_meta,
            limit,
            children: rebuild(children),
        },
        DataSource { .. } => plan,
    }
}
