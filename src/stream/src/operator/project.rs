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

use rengine_common::tuple::{DataRow, SinkRow};
use rengine_common::Map;
use rengine_expr::eval::{eval, eval_grouped};
use rengine_sqlparser::ast::{Expr, Field};

use super::{rows_of, OpResult, Operation, OperationError};
use crate::message::StreamData;

/// Evaluates the select list per tuple (or per group for aggregate
/// statements), names outputs via alias, and strips metadata unless the rule
/// asked to keep it. Emits one batch per input payload.
pub struct ProjectOp {
    pub fields: Vec<Field>,
    pub is_aggregate: bool,
    pub send_meta: bool,
    pub limit: Option<usize>,
}

impl ProjectOp {
    fn err(e: impl std::fmt::Display) -> OperationError {
        OperationError(format!("run Select error: {e}"))
    }

    /// Output name of the `idx`-th select item; unnamed expressions get a
    /// generated `rengine_field_<idx>` name.
    fn output_name(field: &Field, idx: usize) -> String {
        field
            .output_name()
            .map(str::to_owned)
            .unwrap_or_else(|| format!("rengine_field_{idx}"))
    }

    fn project_row(&self, row: &DataRow) -> Result<SinkRow, OperationError> {
        let mut fields = Map::new();
        for (idx, field) in self.fields.iter().enumerate() {
            if matches!(field.expr, Expr::Wildcard) {
                fields.extend(row.fields());
                continue;
            }
            let value = eval(&field.expr, row).map_err(Self::err)?;
            fields.insert(Self::output_name(field, idx), value);
        }
        Ok(SinkRow {
            fields,
            metadata: self.send_meta.then(|| row.metadata().cloned().unwrap_or_default()),
        })
    }

    fn project_group(&self, rows: &[DataRow]) -> Result<SinkRow, OperationError> {
        let mut fields = Map::new();
        for (idx, field) in self.fields.iter().enumerate() {
            if matches!(field.expr, Expr::Wildcard) {
                if let Some(first) = rows.first() {
                    fields.extend(first.fields());
                }
                continue;
            }
            let value = eval_grouped(&field.expr, rows).map_err(Self::err)?;
            fields.insert(Self::output_name(field, idx), value);
        }
        Ok(SinkRow {
            fields,
            metadata: None,
        })
    }
}

impl Operation for ProjectOp {
    fn apply(&self, data: StreamData) -> OpResult {
        let mut out: Vec<SinkRow> = match data {
            StreamData::Groups(ref g) if self.is_aggregate => g
                .groups
                .iter()
                .map(|rows| self.project_group(rows))
                .collect::<Result<_, _>>()?,
            data @ (StreamData::Batch(_) | StreamData::Raw(_) | StreamData::Error(_)) => {
                return Ok(vec![data])
            }
            ref other => {
                let rows = rows_of(other);
                if self.is_aggregate {
                    // aggregate statement without an upstream aggregate node:
                    // the whole payload is one group
                    if rows.is_empty() {
                        return Ok(vec![]);
                    }
                    vec![self.project_group(&rows)?]
                } else {
                    rows.iter()
                        .map(|row| self.project_row(row))
                        .collect::<Result<_, _>>()?
                }
            }
        };
        if let Some(limit) = self.limit {
            out.truncate(limit);
        }
        if out.is_empty() {
            Ok(vec![])
        } else {
            Ok(vec![StreamData::Batch(out)])
        }
    }
}
