use crate::error::ErrorDetail;
use crate::memory::{IntReference, Memory, StrReference};

/// One decoded element of the scenario instruction stream.
///
/// How these were encoded on disk is out of the interpreter's hands; the
/// [Scenario](crate::scenario::Scenario) source hands them over ready-made.
#[derive(Clone, Debug, PartialEq)]
pub enum Instruction {
    /// A command: namespaced opcode plus its inline parameter expressions.
    Opcode {
        module: u8,
        opcode: u16,
        overload: u8,
        args: Vec<Expr>,
    },
    /// A run of narrative text to reveal in the current text window.
    Textout(String),
    /// A source-line marker.  Drives per-line game hacks and error context.
    Line(i32),
    /// End of scenario; sets the terminal halt flag.
    Halt,
}

/// A node in an instruction's inline parameter expression tree.
///
/// This is the decoded form of RealLive's parameter grammar: constants,
/// memory references, parenthesised tuples and tagged unions.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    IntConst(i32),
    StrConst(String),
    IntRef(IntReference),
    StrRef(StrReference),
    Complex(Vec<Expr>),
    Special { tag: u8, exprs: Vec<Expr> },
}

/// A handler's declared parameter signature, one element per parameter.
///
/// The dispatch layer walks the signature against the instruction's
/// expression tree, evaluating or passing through each node as declared.
#[derive(Clone, Debug, PartialEq)]
pub enum ParamSpec {
    /// Any integer expression, evaluated to its value.
    IntConstant,
    /// Any string expression, evaluated to its value.
    StrConstant,
    /// A writable integer slot; the handle itself is passed through.
    IntReference,
    /// A writable string slot.
    StrReference,
    /// A fixed-arity tuple of sub-parameters.
    Complex(Vec<ParamSpec>),
    /// Zero or more trailing parameters of one shape.  Must be last.
    Argc(Box<ParamSpec>),
    /// A tagged union: each `(tag, shape)` pair is one accepted variant.
    Special(Vec<(u8, Vec<ParamSpec>)>),
}

/// A decoded argument as delivered to an opcode handler.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Int(i32),
    Str(String),
    IntRef(IntReference),
    StrRef(StrReference),
    Complex(Vec<Value>),
    Special { tag: u8, values: Vec<Value> },
}

impl Value {
    /// Returns the integer payload; handlers call this on parameters their
    /// signature declared [ParamSpec::IntConstant].
    pub fn as_int(&self) -> Result<i32, ErrorDetail> {
        match self {
            Value::Int(v) => Ok(*v),
            other => Err(ErrorDetail::BadOpcodeArguments {
                name: "<handler>".to_string(),
                reason: format!("expected integer, got {:?}", other),
            }),
        }
    }

    /// Returns the string payload.
    pub fn as_str(&self) -> Result<&str, ErrorDetail> {
        match self {
            Value::Str(s) => Ok(s.as_str()),
            other => Err(ErrorDetail::BadOpcodeArguments {
                name: "<handler>".to_string(),
                reason: format!("expected string, got {:?}", other),
            }),
        }
    }

    /// Returns the integer-reference payload.
    pub fn as_int_ref(&self) -> Result<IntReference, ErrorDetail> {
        match self {
            Value::IntRef(r) => Ok(*r),
            other => Err(ErrorDetail::BadOpcodeArguments {
                name: "<handler>".to_string(),
                reason: format!("expected integer reference, got {:?}", other),
            }),
        }
    }
}

fn mismatch(name: &str, reason: String) -> ErrorDetail {
    ErrorDetail::BadOpcodeArguments {
        name: name.to_string(),
        reason,
    }
}

/// Decodes one expression against one declared parameter shape.
fn decode_one(
    name: &str,
    spec: &ParamSpec,
    expr: &Expr,
    memory: &Memory,
) -> Result<Value, ErrorDetail> {
    match (spec, expr) {
        (ParamSpec::IntConstant, Expr::IntConst(v)) => Ok(Value::Int(*v)),
        (ParamSpec::IntConstant, Expr::IntRef(r)) => Ok(Value::Int(memory.read_ref(*r)?)),
        (ParamSpec::StrConstant, Expr::StrConst(s)) => Ok(Value::Str(s.clone())),
        (ParamSpec::StrConstant, Expr::StrRef(r)) => {
            Ok(Value::Str(memory.get_str(r.bank, r.index)?.to_string()))
        }
        (ParamSpec::IntReference, Expr::IntRef(r)) => Ok(Value::IntRef(*r)),
        (ParamSpec::StrReference, Expr::StrRef(r)) => Ok(Value::StrRef(r.clone())),
        (ParamSpec::Complex(shapes), Expr::Complex(exprs)) => {
            if shapes.len() != exprs.len() {
                return Err(mismatch(
                    name,
                    format!(
                        "complex parameter has {} elements, signature wants {}",
                        exprs.len(),
                        shapes.len()
                    ),
                ));
            }
            let values = shapes
                .iter()
                .zip(exprs)
                .map(|(shape, e)| decode_one(name, shape, e, memory))
                .collect::<Result<Vec<Value>, ErrorDetail>>()?;
            Ok(Value::Complex(values))
        }
        (ParamSpec::Special(variants), Expr::Special { tag, exprs }) => {
            let (_, shapes) = variants
                .iter()
                .find(|(t, _)| t == tag)
                .ok_or_else(|| mismatch(name, format!("unknown special tag {}", tag)))?;
            if shapes.len() != exprs.len() {
                return Err(mismatch(
                    name,
                    format!("special tag {} wants {} elements", tag, shapes.len()),
                ));
            }
            let values = shapes
                .iter()
                .zip(exprs)
                .map(|(shape, e)| decode_one(name, shape, e, memory))
                .collect::<Result<Vec<Value>, ErrorDetail>>()?;
            Ok(Value::Special {
                tag: *tag,
                values,
            })
        }
        (spec, expr) => Err(mismatch(
            name,
            format!("parameter {:?} does not match declared {:?}", expr, spec),
        )),
    }
}

/// Decodes an instruction's expression list against a handler's declared
/// signature, evaluating constants and passing references through.
///
/// An [ParamSpec::Argc] element swallows every remaining expression and so
/// must be the final element of the signature.
pub fn decode_args(
    name: &str,
    signature: &[ParamSpec],
    exprs: &[Expr],
    memory: &Memory,
) -> Result<Vec<Value>, ErrorDetail> {
    let mut values = Vec::with_capacity(exprs.len());
    let mut position = 0;

    for (i, spec) in signature.iter().enumerate() {
        if let ParamSpec::Argc(inner) = spec {
            if i + 1 != signature.len() {
                return Err(mismatch(name, "Argc must be last in signature".to_string()));
            }
            while position < exprs.len() {
                values.push(decode_one(name, inner, &exprs[position], memory)?);
                position += 1;
            }
            return Ok(values);
        }
        let expr = exprs.get(position).ok_or_else(|| {
            mismatch(
                name,
                format!("expected {} parameters, got {}", signature.len(), exprs.len()),
            )
        })?;
        values.push(decode_one(name, spec, expr, memory)?);
        position += 1;
    }

    if position != exprs.len() {
        return Err(mismatch(
            name,
            format!("expected {} parameters, got {}", signature.len(), exprs.len()),
        ));
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{BitWidth, IntBank, StrBank};

    #[test]
    fn test_constants_decode_directly() {
        let memory = Memory::new();
        let values = decode_args(
            "test",
            &[ParamSpec::IntConstant, ParamSpec::StrConstant],
            &[Expr::IntConst(42), Expr::StrConst("bgm01".to_string())],
            &memory,
        )
        .unwrap();
        assert_eq!(values[0].as_int().unwrap(), 42);
        assert_eq!(values[1].as_str().unwrap(), "bgm01");
    }

    #[test]
    fn test_reference_evaluates_when_signature_wants_a_constant() {
        let mut memory = Memory::new();
        memory
            .set_int(IntBank::A, BitWidth::Full, 10, 777)
            .unwrap();
        let values = decode_args(
            "test",
            &[ParamSpec::IntConstant],
            &[Expr::IntRef(IntReference::full(IntBank::A, 10))],
            &memory,
        )
        .unwrap();
        assert_eq!(values[0].as_int().unwrap(), 777);
    }

    #[test]
    fn test_reference_passes_through_when_signature_wants_a_reference() {
        let memory = Memory::new();
        let reference = IntReference::full(IntBank::B, 3);
        let values = decode_args(
            "test",
            &[ParamSpec::IntReference],
            &[Expr::IntRef(reference)],
            &memory,
        )
        .unwrap();
        assert_eq!(values[0].as_int_ref().unwrap(), reference);
    }

    #[test]
    fn test_constant_does_not_satisfy_reference() {
        let memory = Memory::new();
        let result = decode_args(
            "test",
            &[ParamSpec::IntReference],
            &[Expr::IntConst(5)],
            &memory,
        );
        assert!(matches!(
            result.unwrap_err(),
            ErrorDetail::BadOpcodeArguments { .. }
        ));
    }

    #[test]
    fn test_argc_consumes_remaining_parameters() {
        let memory = Memory::new();
        let values = decode_args(
            "test",
            &[
                ParamSpec::IntConstant,
                ParamSpec::Argc(Box::new(ParamSpec::IntConstant)),
            ],
            &[Expr::IntConst(1), Expr::IntConst(2), Expr::IntConst(3)],
            &memory,
        )
        .unwrap();
        assert_eq!(values.len(), 3);
        // Argc also matches the empty tail.
        let values = decode_args(
            "test",
            &[ParamSpec::Argc(Box::new(ParamSpec::IntConstant))],
            &[],
            &memory,
        )
        .unwrap();
        assert!(values.is_empty());
    }

    #[test]
    fn test_complex_arity_is_checked() {
        let memory = Memory::new();
        let spec = ParamSpec::Complex(vec![ParamSpec::IntConstant, ParamSpec::IntConstant]);
        let result = decode_args(
            "test",
            &[spec],
            &[Expr::Complex(vec![Expr::IntConst(1)])],
            &memory,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_special_matches_declared_tag_only() {
        let memory = Memory::new();
        let spec = ParamSpec::Special(vec![
            (0, vec![ParamSpec::IntConstant]),
            (1, vec![ParamSpec::StrConstant]),
        ]);
        let good = decode_args(
            "test",
            std::slice::from_ref(&spec),
            &[Expr::Special {
                tag: 1,
                exprs: vec![Expr::StrConst("koe".to_string())],
            }],
            &memory,
        )
        .unwrap();
        assert_eq!(
            good[0],
            Value::Special {
                tag: 1,
                values: vec![Value::Str("koe".to_string())]
            }
        );

        let bad = decode_args(
            "test",
            std::slice::from_ref(&spec),
            &[Expr::Special {
                tag: 9,
                exprs: vec![],
            }],
            &memory,
        );
        assert!(bad.is_err());
    }

    #[test]
    fn test_string_reference_reads_bank() {
        let mut memory = Memory::new();
        memory
            .set_str(StrBank::S, 4, "farewell".to_string())
            .unwrap();
        let values = decode_args(
            "test",
            &[ParamSpec::StrConstant],
            &[Expr::StrRef(StrReference {
                bank: StrBank::S,
                index: 4,
            })],
            &memory,
        )
        .unwrap();
        assert_eq!(values[0].as_str().unwrap(), "farewell");
    }

    #[test]
    fn test_excess_parameters_are_rejected() {
        let memory = Memory::new();
        let result = decode_args(
            "test",
            &[ParamSpec::IntConstant],
            &[Expr::IntConst(1), Expr::IntConst(2)],
            &memory,
        );
        assert!(result.is_err());
    }
}
