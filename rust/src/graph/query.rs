/*
 * VexFS - Vector Extended File System
 * Copyright 2025 VexFS Contributors
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! C13: the VQL subset (spec.md §4.6) -- `MATCH (v[:Type])` optionally
//! followed by `-[e[:EdgeType]]->(w[:Type])`, an optional `WHERE v.prop OP
//! literal`, and `RETURN ...` with an optional `LIMIT`.
//!
//! Grounded on the teacher's `semantic_query_executor::QueryExecutor`
//! (`Plan`-then-execute shape), trimmed to this single-hop grammar; the
//! teacher's richer joins/aggregation (`semantic_query_language.rs`) are not
//! implemented here -- spec.md's Non-goals exclude a "SQL-style query
//! optimizer" and this contract only ever names one hop.

use crate::graph::index::{IndexKey, IndexKind, IndexManager};
use crate::graph::store::{EdgeType, GraphStore, NodeType, PropertyValue};
use crate::shared::errors::{VexfsError, VexfsResult};
use crate::shared::types::{EdgeId, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartStrategy {
    FullScan,
    TypeIndex,
    PropertyIndex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Integer(i64),
    Boolean(bool),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyFilter {
    pub property: String,
    pub op: FilterOp,
    pub value: Literal,
}

/// The parsed form of one VQL statement.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedQuery {
    pub node_var: String,
    pub node_type: Option<NodeType>,
    pub edge_var: Option<String>,
    pub edge_type: Option<EdgeType>,
    pub target_var: Option<String>,
    pub target_type: Option<NodeType>,
    pub filter: Option<PropertyFilter>,
    pub projection: Vec<String>,
    pub limit: usize,
}

/// `{start_strategy, filters, projection, limit}` (spec.md §4.6).
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub start_strategy: StartStrategy,
    pub filters: Vec<PropertyFilter>,
    pub projection: Vec<String>,
    pub limit: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryValue {
    Node(NodeId),
    Edge(EdgeId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryRow(pub Vec<(String, QueryValue)>);

fn node_type_from_str(s: &str) -> VexfsResult<NodeType> {
    match s.to_ascii_lowercase().as_str() {
        "file" => Ok(NodeType::File),
        "directory" => Ok(NodeType::Directory),
        "vector" => Ok(NodeType::Vector),
        "collection" => Ok(NodeType::Collection),
        "semantic" => Ok(NodeType::Semantic),
        "custom" => Ok(NodeType::Custom),
        other => Err(VexfsError::invalid_param(format!("unknown node type '{other}'"))),
    }
}

fn edge_type_from_str(s: &str) -> VexfsResult<EdgeType> {
    match s.to_ascii_lowercase().as_str() {
        "contains" => Ok(EdgeType::Contains),
        "references" => Ok(EdgeType::References),
        "similar" => Ok(EdgeType::Similar),
        "semantic" => Ok(EdgeType::Semantic),
        "temporal" => Ok(EdgeType::Temporal),
        "dependency" => Ok(EdgeType::Dependency),
        "hierarchy" => Ok(EdgeType::Hierarchy),
        "custom" => Ok(EdgeType::Custom),
        other => Err(VexfsError::invalid_param(format!("unknown edge type '{other}'"))),
    }
}

/// Splits a VQL string into punctuation-aware tokens, keeping quoted
/// strings intact (e.g. `"x"` stays one token).
fn tokenize(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if c == '"' {
            chars.next();
            let mut s = String::from("\"");
            while let Some(&c2) = chars.peek() {
                chars.next();
                if c2 == '"' {
                    break;
                }
                s.push(c2);
            }
            s.push('"');
            tokens.push(s);
            continue;
        }
        if "()[]:,.".contains(c) {
            chars.next();
            tokens.push(c.to_string());
            continue;
        }
        if "-=<>!".contains(c) {
            chars.next();
            let mut s = c.to_string();
            if let Some(&next) = chars.peek() {
                if (c == '-' && next == '>') || (c != '-' && next == '=') {
                    s.push(next);
                    chars.next();
                }
            }
            tokens.push(s);
            continue;
        }
        let mut s = String::new();
        while let Some(&c2) = chars.peek() {
            if c2.is_whitespace() || "()[]:,.\"-=<>!".contains(c2) {
                break;
            }
            s.push(c2);
            chars.next();
        }
        tokens.push(s);
    }
    tokens
}

struct TokenStream {
    tokens: Vec<String>,
    pos: usize,
}

impl TokenStream {
    fn peek(&self) -> Option<&str> {
        self.tokens.get(self.pos).map(|s| s.as_str())
    }

    fn next(&mut self) -> VexfsResult<String> {
        let t = self.tokens.get(self.pos).cloned().ok_or_else(|| VexfsError::invalid_param("unexpected end of query"))?;
        self.pos += 1;
        Ok(t)
    }

    fn expect(&mut self, literal: &str) -> VexfsResult<()> {
        let t = self.next()?;
        if t.eq_ignore_ascii_case(literal) {
            Ok(())
        } else {
            Err(VexfsError::invalid_param(format!("expected '{literal}', found '{t}'")))
        }
    }
}

/// Parses `(var[:Type])` and returns `(var, type)`.
fn parse_node_pattern(ts: &mut TokenStream) -> VexfsResult<(String, Option<String>)> {
    ts.expect("(")?;
    let var = ts.next()?;
    let ty = if ts.peek() == Some(":") {
        ts.next()?;
        Some(ts.next()?)
    } else {
        None
    };
    ts.expect(")")?;
    Ok((var, ty))
}

/// Parses the top-level VQL grammar spec.md §4.6 names:
/// `MATCH (v[:Type]) [-[e[:EdgeType]]->(w[:Type])] [WHERE v.prop OP lit]
/// RETURN proj[, proj...] [LIMIT n]`.
pub fn parse(query: &str) -> VexfsResult<ParsedQuery> {
    let tokens = tokenize(query);
    let mut ts = TokenStream { tokens, pos: 0 };
    ts.expect("MATCH")?;
    let (node_var, node_type_str) = parse_node_pattern(&mut ts)?;
    let node_type = node_type_str.map(|s| node_type_from_str(&s)).transpose()?;

    let mut edge_var = None;
    let mut edge_type = None;
    let mut target_var = None;
    let mut target_type = None;
    if ts.peek() == Some("-") {
        ts.next()?;
        ts.expect("[")?;
        edge_var = Some(ts.next()?);
        if ts.peek() == Some(":") {
            ts.next()?;
            edge_type = Some(edge_type_from_str(&ts.next()?)?);
        }
        ts.expect("]")?;
        ts.expect("->")?;
        let (tv, tty) = parse_node_pattern(&mut ts)?;
        target_var = Some(tv);
        target_type = tty.map(|s| node_type_from_str(&s)).transpose()?;
    }

    let mut filter = None;
    if ts.peek().map(|t| t.eq_ignore_ascii_case("WHERE")).unwrap_or(false) {
        ts.next()?;
        let _var = ts.next()?; // carrier variable; only `v.prop` is supported (spec.md §4.6)
        ts.expect(".")?;
        let property = ts.next()?;
        let op_tok = ts.next()?;
        let op = match op_tok.as_str() {
            "=" => FilterOp::Eq,
            "!=" => FilterOp::Ne,
            ">" => FilterOp::Gt,
            "<" => FilterOp::Lt,
            ">=" => FilterOp::Ge,
            "<=" => FilterOp::Le,
            other => return Err(VexfsError::invalid_param(format!("unknown comparison operator '{other}'"))),
        };
        let literal_tok = ts.next()?;
        let value = if let Some(s) = literal_tok.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
            Literal::String(s.to_string())
        } else if let Ok(i) = literal_tok.parse::<i64>() {
            Literal::Integer(i)
        } else if literal_tok.eq_ignore_ascii_case("true") {
            Literal::Boolean(true)
        } else if literal_tok.eq_ignore_ascii_case("false") {
            Literal::Boolean(false)
        } else {
            return Err(VexfsError::invalid_param(format!("unparseable literal '{literal_tok}'")));
        };
        filter = Some(PropertyFilter { property, op, value });
    }

    ts.expect("RETURN")?;
    let mut projection = vec![ts.next()?];
    while ts.peek() == Some(",") {
        ts.next()?;
        projection.push(ts.next()?);
    }

    let limit = if ts.peek().map(|t| t.eq_ignore_ascii_case("LIMIT")).unwrap_or(false) {
        ts.next()?;
        let n = ts.next()?;
        n.parse::<usize>().map_err(|_| VexfsError::invalid_param(format!("invalid LIMIT '{n}'")))?
    } else {
        usize::MAX
    };

    Ok(ParsedQuery {
        node_var,
        node_type,
        edge_var,
        edge_type,
        target_var,
        target_type,
        filter,
        projection,
        limit,
    })
}

/// Choice rule (spec.md §4.6): exact-match property filter with a live
/// `ByProperty` index wins, then a node-type filter, else a full scan.
pub fn plan(parsed: &ParsedQuery, index: &IndexManager) -> Plan {
    let start_strategy = match &parsed.filter {
        Some(f)
            if f.op == FilterOp::Eq
                && index.statistics(IndexKind::ByProperty, &IndexKey::Property(f.property.clone())).is_ok() =>
        {
            StartStrategy::PropertyIndex
        }
        _ if parsed.node_type.is_some() => StartStrategy::TypeIndex,
        _ => StartStrategy::FullScan,
    };
    Plan {
        start_strategy,
        filters: parsed.filter.clone().into_iter().collect(),
        projection: parsed.projection.clone(),
        limit: parsed.limit,
    }
}

fn property_matches(value: &PropertyValue, filter: &PropertyFilter) -> bool {
    use std::cmp::Ordering;
    let ord = match (value, &filter.value) {
        (PropertyValue::String(a), Literal::String(b)) => Some(a.as_str().cmp(b.as_str())),
        (PropertyValue::Integer(a), Literal::Integer(b)) => Some(a.cmp(b)),
        (PropertyValue::Boolean(a), Literal::Boolean(b)) => Some(a.cmp(b)),
        _ => None,
    };
    match ord {
        Some(Ordering::Equal) => matches!(filter.op, FilterOp::Eq | FilterOp::Ge | FilterOp::Le),
        Some(Ordering::Less) => matches!(filter.op, FilterOp::Ne | FilterOp::Lt | FilterOp::Le),
        Some(Ordering::Greater) => matches!(filter.op, FilterOp::Ne | FilterOp::Gt | FilterOp::Ge),
        None => false,
    }
}

/// Picks the start-set ids per `plan.start_strategy`, then lazily applies
/// `plan.filters` and the node-type filter while building rows, stopping at
/// `plan.limit`.
pub fn execute(store: &GraphStore, index: &IndexManager, parsed: &ParsedQuery, plan: &Plan) -> VexfsResult<Vec<QueryRow>> {
    let start_ids: Vec<NodeId> = match plan.start_strategy {
        StartStrategy::PropertyIndex => {
            let key = IndexKey::Property(plan.filters[0].property.clone());
            index
                .postings_snapshot(IndexKind::ByProperty, &key)?
                .into_iter()
                .map(NodeId::new)
                .collect()
        }
        StartStrategy::TypeIndex => {
            let nt = parsed.node_type.expect("TypeIndex strategy implies a node-type filter");
            store.nodes_by_type(nt)
        }
        StartStrategy::FullScan => store.node_ids_ordered(),
    };

    let mut rows = Vec::new();
    for id in start_ids {
        if rows.len() >= plan.limit {
            break;
        }
        let Some(node) = store.node_snapshot(id) else { continue };
        if let Some(nt) = parsed.node_type {
            if node.node_type != nt {
                continue;
            }
        }
        if let Some(f) = &parsed.filter {
            let Some(prop) = node.property(&f.property) else { continue };
            if !property_matches(&prop.value, f) {
                continue;
            }
        }

        if parsed.target_var.is_none() {
            let row: Vec<(String, QueryValue)> =
                parsed.projection.iter().filter(|v| **v == parsed.node_var).map(|v| (v.clone(), QueryValue::Node(id))).collect();
            rows.push(QueryRow(row));
            continue;
        }

        for &eid in &node.outgoing_edges {
            if rows.len() >= plan.limit {
                break;
            }
            let Some(edge) = store.edge_snapshot(eid) else { continue };
            if let Some(et) = parsed.edge_type {
                if edge.edge_type != et {
                    continue;
                }
            }
            let Some(target) = store.node_snapshot(edge.target_id) else { continue };
            if let Some(tt) = parsed.target_type {
                if target.node_type != tt {
                    continue;
                }
            }
            let mut row = Vec::new();
            for var in &parsed.projection {
                if *var == parsed.node_var {
                    row.push((var.clone(), QueryValue::Node(id)));
                } else if Some(var) == parsed.edge_var.as_ref() {
                    row.push((var.clone(), QueryValue::Edge(eid)));
                } else if Some(var) == parsed.target_var.as_ref() {
                    row.push((var.clone(), QueryValue::Node(edge.target_id)));
                }
            }
            rows.push(QueryRow(row));
        }
    }
    Ok(rows)
}

/// Convenience facade: parse, plan, and execute in one call.
#[derive(Debug, Default)]
pub struct QueryPlanner;

impl QueryPlanner {
    pub fn new() -> Self {
        Self
    }

    pub fn run(&self, store: &GraphStore, index: &IndexManager, query: &str) -> VexfsResult<Vec<QueryRow>> {
        let parsed = parse(query)?;
        let p = plan(&parsed, index);
        execute(store, index, &parsed, &p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::clock::FakeClock;

    #[test]
    fn parses_single_node_match() {
        let q = parse("MATCH (v:File) RETURN v").unwrap();
        assert_eq!(q.node_var, "v");
        assert_eq!(q.node_type, Some(NodeType::File));
        assert_eq!(q.projection, vec!["v"]);
        assert_eq!(q.limit, usize::MAX);
    }

    #[test]
    fn parses_one_hop_with_where_and_limit() {
        let q = parse(r#"MATCH (v:File) -[e:CONTAINS]-> (w:Directory) WHERE v.name = "x" RETURN v, w LIMIT 10"#).unwrap();
        assert_eq!(q.edge_type, Some(EdgeType::Contains));
        assert_eq!(q.target_type, Some(NodeType::Directory));
        assert_eq!(q.filter, Some(PropertyFilter { property: "name".into(), op: FilterOp::Eq, value: Literal::String("x".into()) }));
        assert_eq!(q.projection, vec!["v", "w"]);
        assert_eq!(q.limit, 10);
    }

    #[test]
    fn plan_prefers_property_index_when_available() {
        let idx = IndexManager::new();
        idx.create(IndexKind::ByProperty, IndexKey::Property("name".into())).unwrap();
        let q = parse(r#"MATCH (v:File) WHERE v.name = "x" RETURN v"#).unwrap();
        let p = plan(&q, &idx);
        assert_eq!(p.start_strategy, StartStrategy::PropertyIndex);
    }

    #[test]
    fn plan_falls_back_to_type_index_then_full_scan() {
        let idx = IndexManager::new();
        let with_type = parse("MATCH (v:File) RETURN v").unwrap();
        assert_eq!(plan(&with_type, &idx).start_strategy, StartStrategy::TypeIndex);

        let without_type = parse("MATCH (v) RETURN v").unwrap();
        assert_eq!(plan(&without_type, &idx).start_strategy, StartStrategy::FullScan);
    }

    #[test]
    fn execute_returns_matching_rows() {
        let store = GraphStore::new();
        let clock = FakeClock::new(1);
        let a = store.create_node(&clock, None, NodeType::File).unwrap();
        store.add_node_property(&clock, a, "name", PropertyValue::String("x".into())).unwrap();
        let _b = store.create_node(&clock, None, NodeType::Directory).unwrap();

        let idx = IndexManager::new();
        let planner = QueryPlanner::new();
        let rows = planner.run(&store, &idx, r#"MATCH (v:File) WHERE v.name = "x" RETURN v"#).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0, vec![("v".to_string(), QueryValue::Node(a))]);
    }

    #[test]
    fn execute_one_hop_projects_all_three_vars() {
        let store = GraphStore::new();
        let clock = FakeClock::new(1);
        let a = store.create_node(&clock, None, NodeType::Directory).unwrap();
        let b = store.create_node(&clock, None, NodeType::File).unwrap();
        let e = store.create_edge(&clock, a, b, EdgeType::Contains, 1.0).unwrap();

        let idx = IndexManager::new();
        let planner = QueryPlanner::new();
        let rows = planner.run(&store, &idx, "MATCH (v:Directory) -[e:CONTAINS]-> (w:File) RETURN v, e, w").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows[0].0,
            vec![("v".to_string(), QueryValue::Node(a)), ("e".to_string(), QueryValue::Edge(e)), ("w".to_string(), QueryValue::Node(b))]
        );
    }
}
