//! Minimal JSON patch (RFC 6902 `add` / `remove` / `replace`) over
//! `serde_json::Value` trees.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, RpcError};

/// One patch operation. Paths are JSON pointers (RFC 6901).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOp {
    Add { path: String, value: Value },
    Remove { path: String },
    Replace { path: String, value: Value },
}

impl PatchOp {
    pub fn path(&self) -> &str {
        match self {
            PatchOp::Add { path, .. } | PatchOp::Remove { path } | PatchOp::Replace { path, .. } => {
                path
            }
        }
    }
}

/// Operations turning `from` into `to`. Empty when the trees are equal.
pub fn create_patch(from: &Value, to: &Value) -> Vec<PatchOp> {
    let mut ops = Vec::new();
    diff_into(from, to, "", &mut ops);
    ops
}

fn diff_into(from: &Value, to: &Value, path: &str, ops: &mut Vec<PatchOp>) {
    if from == to {
        return;
    }
    match (from, to) {
        (Value::Object(a), Value::Object(b)) => {
            for (key, av) in a {
                let child = child_path(path, key);
                match b.get(key) {
                    Some(bv) => diff_into(av, bv, &child, ops),
                    None => ops.push(PatchOp::Remove { path: child }),
                }
            }
            for (key, bv) in b {
                if !a.contains_key(key) {
                    ops.push(PatchOp::Add {
                        path: child_path(path, key),
                        value: bv.clone(),
                    });
                }
            }
        }
        (Value::Array(a), Value::Array(b)) => {
            let common = a.len().min(b.len());
            for (i, (av, bv)) in a.iter().zip(b.iter()).enumerate() {
                diff_into(av, bv, &child_path(path, &i.to_string()), ops);
            }
            // trailing removals highest index first so earlier indices stay valid
            for i in (common..a.len()).rev() {
                ops.push(PatchOp::Remove {
                    path: child_path(path, &i.to_string()),
                });
            }
            for (i, bv) in b.iter().enumerate().skip(common) {
                ops.push(PatchOp::Add {
                    path: child_path(path, &i.to_string()),
                    value: bv.clone(),
                });
            }
        }
        _ => ops.push(PatchOp::Replace {
            path: path.to_string(),
            value: to.clone(),
        }),
    }
}

fn child_path(parent: &str, token: &str) -> String {
    format!("{parent}/{}", token.replace('~', "~0").replace('/', "~1"))
}

fn parse_pointer(path: &str) -> Result<Vec<String>> {
    if path.is_empty() {
        return Ok(Vec::new());
    }
    let rest = path
        .strip_prefix('/')
        .ok_or_else(|| patch_error(path, "pointer must start with '/'"))?;
    Ok(rest
        .split('/')
        .map(|t| t.replace("~1", "/").replace("~0", "~"))
        .collect())
}

fn patch_error(path: &str, why: &str) -> RpcError {
    RpcError::Protocol(format!("patch failed at {path:?}: {why}"))
}

fn parse_index(path: &str, token: &str, upper_inclusive: usize) -> Result<usize> {
    let idx: usize = token
        .parse()
        .map_err(|_| patch_error(path, "invalid array index"))?;
    if idx > upper_inclusive {
        return Err(patch_error(path, "array index out of bounds"));
    }
    Ok(idx)
}

fn resolve_mut<'a>(mut cur: &'a mut Value, tokens: &[String], path: &str) -> Result<&'a mut Value> {
    for token in tokens {
        cur = match cur {
            Value::Object(map) => map
                .get_mut(token)
                .ok_or_else(|| patch_error(path, "missing object member"))?,
            Value::Array(arr) => {
                let idx: usize = token
                    .parse()
                    .map_err(|_| patch_error(path, "invalid array index"))?;
                arr.get_mut(idx)
                    .ok_or_else(|| patch_error(path, "array index out of bounds"))?
            }
            _ => return Err(patch_error(path, "path crosses a scalar")),
        };
    }
    Ok(cur)
}

/// Apply `ops` in order. On error `target` may be partially patched; callers
/// that need atomicity patch a copy.
pub fn apply_patch(target: &mut Value, ops: &[PatchOp]) -> Result<()> {
    for op in ops {
        apply_one(target, op)?;
    }
    Ok(())
}

fn apply_one(target: &mut Value, op: &PatchOp) -> Result<()> {
    let path = op.path();
    let tokens = parse_pointer(path)?;
    let Some((last, parents)) = tokens.split_last() else {
        match op {
            PatchOp::Add { value, .. } | PatchOp::Replace { value, .. } => *target = value.clone(),
            PatchOp::Remove { .. } => *target = Value::Null,
        }
        return Ok(());
    };

    let parent = resolve_mut(target, parents, path)?;
    match (op, parent) {
        (PatchOp::Add { value, .. }, Value::Object(map)) => {
            map.insert(last.clone(), value.clone());
        }
        (PatchOp::Add { value, .. }, Value::Array(arr)) => {
            let idx = if last == "-" {
                arr.len()
            } else {
                parse_index(path, last, arr.len())?
            };
            arr.insert(idx, value.clone());
        }
        (PatchOp::Replace { value, .. }, Value::Object(map)) => {
            let slot = map
                .get_mut(last)
                .ok_or_else(|| patch_error(path, "replace of missing member"))?;
            *slot = value.clone();
        }
        (PatchOp::Replace { value, .. }, Value::Array(arr)) => {
            let idx = parse_index(path, last, arr.len().saturating_sub(1))?;
            let slot = arr
                .get_mut(idx)
                .ok_or_else(|| patch_error(path, "array index out of bounds"))?;
            *slot = value.clone();
        }
        (PatchOp::Remove { .. }, Value::Object(map)) => {
            map.remove(last)
                .ok_or_else(|| patch_error(path, "remove of missing member"))?;
        }
        (PatchOp::Remove { .. }, Value::Array(arr)) => {
            let idx = parse_index(path, last, arr.len().saturating_sub(1))?;
            if idx >= arr.len() {
                return Err(patch_error(path, "array index out of bounds"));
            }
            arr.remove(idx);
        }
        _ => return Err(patch_error(path, "parent is not a container")),
    }
    Ok(())
}
