//! Execution of compiled programs against an environment of named
//! tensors and scalars.
//!
//! The environment has value semantics: destinations are taken out of the
//! map for the duration of a kernel call, so source/destination aliasing
//! is reported as an unknown operand rather than silently misbehaving.
//! Cached temporaries named by the program are returned to the
//! process-wide cache when execution finishes, and generated bindings are
//! dropped.

use std::collections::HashMap;

use crate::cache;
use crate::compiler::ast::{AssignKind, Expr};
use crate::error::TensorOpsError;
use crate::kernels::{add, contract, trace, Conj};
use crate::scalar::Scalar;
use crate::structure::{
    allocate, cached_similar_from_indices, similar_from_indices, similar_structure_pair,
};
use crate::tensor::Tensor;

/// Named operands for program execution.
#[derive(Debug, Default)]
pub struct Env<T: Scalar> {
    tensors: HashMap<String, Tensor<T>>,
    scalars: HashMap<String, T>,
}

impl<T: Scalar> Env<T> {
    pub fn new() -> Self {
        Self {
            tensors: HashMap::new(),
            scalars: HashMap::new(),
        }
    }

    pub fn insert_tensor(&mut self, name: impl Into<String>, tensor: Tensor<T>) {
        self.tensors.insert(name.into(), tensor);
    }

    pub fn insert_scalar(&mut self, name: impl Into<String>, value: T) {
        self.scalars.insert(name.into(), value);
    }

    pub fn tensor(&self, name: &str) -> Option<&Tensor<T>> {
        self.tensors.get(name)
    }

    pub fn scalar(&self, name: &str) -> Option<T> {
        self.scalars.get(name).copied()
    }

    pub fn take_tensor(&mut self, name: &str) -> Option<Tensor<T>> {
        self.tensors.remove(name)
    }
}

/// Execute a compiled program.
///
/// # Errors
///
/// Any kernel error, plus `InvalidExpression` for malformed programs,
/// `UnknownFlag` for bad conjugation flags and `InvalidIndices` when an
/// emitted error construct is reached.
pub fn execute<T: Scalar>(program: &Expr, env: &mut Env<T>) -> Result<(), TensorOpsError> {
    let mut exec = Exec {
        cached: Vec::new(),
        generated: Vec::new(),
    };
    let result = exec.block(program, env);
    for (site, name) in exec.cached.drain(..) {
        if let Some(t) = env.tensors.remove(&name) {
            cache::give_back(site, t);
        }
    }
    for name in exec.generated.drain(..) {
        env.tensors.remove(&name);
        env.scalars.remove(&name);
    }
    result
}

/// Parse, compile and execute source text in one step.
pub fn run_str<T: Scalar>(src: &str, env: &mut Env<T>) -> Result<(), TensorOpsError> {
    let program = crate::compiler::compile_str(src)?;
    execute(&program, env)
}

struct Exec {
    /// Cache-backed temporaries to return: (site tag, binding name).
    cached: Vec<(u64, String)>,
    /// Generated names to drop from the environment afterwards.
    generated: Vec<String>,
}

impl Exec {
    fn block<T: Scalar>(&mut self, e: &Expr, env: &mut Env<T>) -> Result<(), TensorOpsError> {
        for stmt in e.statements() {
            self.statement(stmt, env)?;
        }
        Ok(())
    }

    fn statement<T: Scalar>(&mut self, stmt: &Expr, env: &mut Env<T>) -> Result<(), TensorOpsError> {
        match stmt {
            Expr::Line(_) => Ok(()),
            Expr::Block(_) => self.block(stmt, env),
            Expr::Opaque(inner) => self.block(inner, env),
            Expr::Assign { kind, lhs, rhs } => {
                if *kind != AssignKind::Assign {
                    return Err(TensorOpsError::invalid_expression(
                        "compiled programs only contain plain bindings",
                    ));
                }
                match &**lhs {
                    Expr::Sym(name) => self.bind(name, rhs, env),
                    other => Err(TensorOpsError::invalid_expression(format!(
                        "cannot bind to {:?}",
                        other
                    ))),
                }
            }
            Expr::Call { .. } => self.primitive(stmt, env),
            other => Err(TensorOpsError::invalid_expression(format!(
                "unexpected statement {:?}",
                other
            ))),
        }
    }

    fn note_generated(&mut self, name: &str) {
        if name.starts_with("#t") {
            self.generated.push(name.to_string());
        }
    }

    fn bind<T: Scalar>(
        &mut self,
        name: &str,
        rhs: &Expr,
        env: &mut Env<T>,
    ) -> Result<(), TensorOpsError> {
        self.note_generated(name);
        match rhs {
            Expr::Sym(src) => {
                if let Some(t) = env.tensors.get(src) {
                    let t = t.clone();
                    env.tensors.insert(name.to_string(), t);
                    Ok(())
                } else if let Some(v) = env.scalar(src) {
                    env.scalars.insert(name.to_string(), v);
                    Ok(())
                } else {
                    Err(TensorOpsError::invalid_expression(format!(
                        "unknown operand `{}`",
                        src
                    )))
                }
            }
            Expr::Call { head, args } if head == "tensorops::similar_from_indices" => {
                let tensor = self.alloc_from_args::<T>(args, false, name, env)?;
                env.tensors.insert(name.to_string(), tensor);
                Ok(())
            }
            Expr::Call { head, args } if head == "tensorops::cached_similar_from_indices" => {
                let tensor = self.alloc_from_args::<T>(args, true, name, env)?;
                env.tensors.insert(name.to_string(), tensor);
                Ok(())
            }
            other => {
                let value = eval_scalar(other, env)?;
                env.scalars.insert(name.to_string(), value);
                Ok(())
            }
        }
    }

    /// Allocation primitives: `(src, left, right)` or
    /// `(a, b, pos_a, pos_b, left, right)`, with a trailing site tag for
    /// the cached form.
    fn alloc_from_args<T: Scalar>(
        &mut self,
        args: &[Expr],
        cached: bool,
        name: &str,
        env: &Env<T>,
    ) -> Result<Tensor<T>, TensorOpsError> {
        let (payload, site) = if cached {
            let (site_expr, rest) = args
                .split_last()
                .ok_or_else(|| TensorOpsError::invalid_expression("empty allocation call"))?;
            let site = match site_expr {
                Expr::Int(n) => *n as u64,
                other => {
                    return Err(TensorOpsError::invalid_expression(format!(
                        "bad site tag {:?}",
                        other
                    )));
                }
            };
            (rest, Some(site))
        } else {
            (args, None)
        };

        if let Some(site) = site {
            self.cached.push((site, name.to_string()));
        }
        match payload {
            [Expr::Sym(src), left, right] => {
                let src = lookup_tensor(env, src)?;
                let left = tuple_positions(left)?;
                let right = tuple_positions(right)?;
                Ok(match site {
                    Some(site) => cached_similar_from_indices(site, src, &left, &right),
                    None => similar_from_indices(src, &left, &right),
                })
            }
            [Expr::Sym(a), Expr::Sym(b), pos_a, pos_b, left, right] => {
                let a = lookup_tensor(env, a)?;
                let b = lookup_tensor(env, b)?;
                let shape = similar_structure_pair(
                    a,
                    b,
                    &tuple_positions(pos_a)?,
                    &tuple_positions(pos_b)?,
                    &tuple_positions(left)?,
                    &tuple_positions(right)?,
                );
                Ok(match site {
                    Some(site) => cache::take_or_alloc(site, &shape),
                    None => allocate(&shape),
                })
            }
            other => Err(TensorOpsError::invalid_expression(format!(
                "malformed allocation arguments {:?}",
                other
            ))),
        }
    }

    fn primitive<T: Scalar>(&mut self, call: &Expr, env: &mut Env<T>) -> Result<(), TensorOpsError> {
        let (head, args) = match call {
            Expr::Call { head, args } => (head.as_str(), args.as_slice()),
            _ => unreachable!("primitive() is only called on calls"),
        };
        match head {
            "tensorops::index_error" => {
                let reason = match args.first() {
                    Some(Expr::Str(msg)) => msg.clone(),
                    _ => "malformed expression".to_string(),
                };
                Err(TensorOpsError::InvalidIndices { reason })
            }
            "tensorops::add" => {
                let [alpha, a, flag, beta, c, left, right] = args else {
                    return Err(TensorOpsError::invalid_expression("malformed add call"));
                };
                let alpha = eval_scalar(alpha, env)?;
                let beta = eval_scalar(beta, env)?;
                let conj_a = flag_of(flag)?;
                let left = tuple_positions(left)?;
                let right = tuple_positions(right)?;
                let (a_name, c_name) = (sym_name(a)?, sym_name(c)?);
                let mut dst = take_tensor(env, c_name)?;
                let result = match lookup_tensor(env, a_name) {
                    Ok(src) => add(alpha, src, conj_a, beta, &mut dst, &left, &right),
                    Err(e) => Err(e),
                };
                env.tensors.insert(c_name.to_string(), dst);
                result
            }
            "tensorops::trace" => {
                let [alpha, a, flag, beta, c, left, right, cind1, cind2] = args else {
                    return Err(TensorOpsError::invalid_expression("malformed trace call"));
                };
                let alpha = eval_scalar(alpha, env)?;
                let beta = eval_scalar(beta, env)?;
                let conj_a = flag_of(flag)?;
                let left = tuple_positions(left)?;
                let right = tuple_positions(right)?;
                let cind1 = tuple_positions(cind1)?;
                let cind2 = tuple_positions(cind2)?;
                let (a_name, c_name) = (sym_name(a)?, sym_name(c)?);
                let mut dst = take_tensor(env, c_name)?;
                let result = match lookup_tensor(env, a_name) {
                    Ok(src) => trace(
                        alpha, src, conj_a, beta, &mut dst, &left, &right, &cind1, &cind2,
                    ),
                    Err(e) => Err(e),
                };
                env.tensors.insert(c_name.to_string(), dst);
                result
            }
            "tensorops::contract" => {
                let [alpha, a, flag_a, b, flag_b, beta, c, oind_a, cind_a, oind_b, cind_b, ind_c, sites] =
                    args
                else {
                    return Err(TensorOpsError::invalid_expression(
                        "malformed contract call",
                    ));
                };
                let alpha = eval_scalar(alpha, env)?;
                let beta = eval_scalar(beta, env)?;
                let conj_a = flag_of(flag_a)?;
                let conj_b = flag_of(flag_b)?;
                let oind_a = tuple_positions(oind_a)?;
                let cind_a = tuple_positions(cind_a)?;
                let oind_b = tuple_positions(oind_b)?;
                let cind_b = tuple_positions(cind_b)?;
                let ind_c = tuple_positions(ind_c)?;
                let sites = site_tags(sites)?;
                let (a_name, b_name, c_name) = (sym_name(a)?, sym_name(b)?, sym_name(c)?);
                let mut dst = take_tensor(env, c_name)?;
                let result = match (lookup_tensor(env, a_name), lookup_tensor(env, b_name)) {
                    (Ok(src_a), Ok(src_b)) => contract(
                        alpha,
                        src_a,
                        conj_a,
                        src_b,
                        conj_b,
                        beta,
                        &mut dst,
                        &oind_a,
                        &cind_a,
                        &oind_b,
                        &cind_b,
                        &ind_c,
                        Some(sites),
                    ),
                    (Err(e), _) | (_, Err(e)) => Err(e),
                };
                env.tensors.insert(c_name.to_string(), dst);
                result
            }
            other => Err(TensorOpsError::invalid_expression(format!(
                "unknown primitive `{}`",
                other
            ))),
        }
    }
}

fn sym_name(e: &Expr) -> Result<&str, TensorOpsError> {
    match e {
        Expr::Sym(name) => Ok(name),
        other => Err(TensorOpsError::invalid_expression(format!(
            "expected an operand name, found {:?}",
            other
        ))),
    }
}

fn flag_of(e: &Expr) -> Result<Conj, TensorOpsError> {
    match e {
        Expr::Sym(name) => Conj::from_name(name),
        other => Err(TensorOpsError::invalid_expression(format!(
            "expected a conjugation flag, found {:?}",
            other
        ))),
    }
}

fn tuple_positions(e: &Expr) -> Result<Vec<usize>, TensorOpsError> {
    let items = match e {
        Expr::Tuple(items) => items,
        other => {
            return Err(TensorOpsError::invalid_expression(format!(
                "expected a position tuple, found {:?}",
                other
            )));
        }
    };
    items
        .iter()
        .map(|i| match i {
            Expr::Int(n) if *n >= 0 => Ok(*n as usize),
            other => Err(TensorOpsError::invalid_expression(format!(
                "bad axis position {:?}",
                other
            ))),
        })
        .collect()
}

fn site_tags(e: &Expr) -> Result<[u64; 3], TensorOpsError> {
    match e {
        Expr::Tuple(items) if items.len() == 3 => {
            let mut tags = [0u64; 3];
            for (slot, item) in tags.iter_mut().zip(items.iter()) {
                match item {
                    Expr::Int(n) => *slot = *n as u64,
                    other => {
                        return Err(TensorOpsError::invalid_expression(format!(
                            "bad site tag {:?}",
                            other
                        )));
                    }
                }
            }
            Ok(tags)
        }
        other => Err(TensorOpsError::invalid_expression(format!(
            "expected site tags, found {:?}",
            other
        ))),
    }
}

fn lookup_tensor<'e, T: Scalar>(
    env: &'e Env<T>,
    name: &str,
) -> Result<&'e Tensor<T>, TensorOpsError> {
    env.tensors.get(name).ok_or_else(|| {
        TensorOpsError::invalid_expression(format!("unknown tensor `{}`", name))
    })
}

fn take_tensor<T: Scalar>(env: &mut Env<T>, name: &str) -> Result<Tensor<T>, TensorOpsError> {
    env.tensors.remove(name).ok_or_else(|| {
        TensorOpsError::invalid_expression(format!("unknown destination `{}`", name))
    })
}

fn eval_scalar<T: Scalar>(e: &Expr, env: &Env<T>) -> Result<T, TensorOpsError> {
    match e {
        Expr::Int(n) => Ok(T::from_f64(*n as f64)),
        Expr::Num(x) => Ok(T::from_f64(*x)),
        Expr::Sym(name) => env.scalar(name).ok_or_else(|| {
            TensorOpsError::invalid_expression(format!("unknown scalar `{}`", name))
        }),
        Expr::Call { head, args } => match (head.as_str(), args.len()) {
            ("-", 1) => Ok(-eval_scalar(&args[0], env)?),
            ("-", 2) => Ok(eval_scalar(&args[0], env)? - eval_scalar(&args[1], env)?),
            ("+", _) => {
                let mut acc = T::zero();
                for a in args {
                    acc = acc + eval_scalar(a, env)?;
                }
                Ok(acc)
            }
            ("*", _) => {
                let mut acc = T::one();
                for a in args {
                    acc = acc * eval_scalar(a, env)?;
                }
                Ok(acc)
            }
            ("/", 2) => Ok(eval_scalar(&args[0], env)? / eval_scalar(&args[1], env)?),
            ("conj", 1) => Ok(eval_scalar(&args[0], env)?.conj()),
            ("tensorops::scalar", 1) => match &args[0] {
                Expr::Sym(name) => lookup_tensor(env, name)?.scalar_value(),
                other => Err(TensorOpsError::invalid_expression(format!(
                    "scalar() expects a tensor name, found {:?}",
                    other
                ))),
            },
            _ => Err(TensorOpsError::invalid_expression(format!(
                "cannot evaluate scalar expression {:?}",
                e
            ))),
        },
        other => Err(TensorOpsError::invalid_expression(format!(
            "cannot evaluate scalar expression {:?}",
            other
        ))),
    }
}
