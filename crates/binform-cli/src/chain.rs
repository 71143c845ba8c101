//! Command-line field definitions.
//!
//! A field is written `NAME=CHAIN`, where CHAIN is a `:`-separated list of
//! steps:
//!
//! - `i8 u8 i16 u16 i32 u32 i64 u64 f32 f64`, optionally suffixed with `be`
//!   or `le` (e.g. `u32be`)
//! - `ptr` (zero is null) or `ptr0` (zero is a valid address)
//! - `str`
//! - `[N]` or `[FIELD]`: array; the rest of the chain decodes one element
//!
//! Examples: `count=u8`, `names=[count]:ptr:str`, `magic=u32be`.

use anyhow::{bail, Result};
use binform_core::{ArrayLength, Endian, Member, Primitive, StepOptions};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Primitive(Primitive, Endian),
    Pointer { allow_null: bool },
    String,
    Array(ArrayLength),
}

/// One `NAME=CHAIN` definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FieldDef {
    pub(crate) name: String,
    tokens: Vec<Token>,
}

impl FieldDef {
    /// Parse a `NAME=CHAIN` argument
    pub(crate) fn parse(def: &str) -> Result<Self> {
        let Some((name, chain)) = def.split_once('=') else {
            bail!("field '{}' is missing '=' (expected NAME=CHAIN)", def);
        };

        let name = name.trim();
        if name.is_empty() {
            bail!("field '{}' has an empty name", def);
        }

        let tokens = chain
            .split(':')
            .map(|token| parse_token(token.trim()))
            .collect::<Result<Vec<_>>>()?;

        check_chain(name, &tokens)?;

        Ok(Self {
            name: name.to_string(),
            tokens,
        })
    }

    /// Configure `member` with this chain
    pub(crate) fn apply(&self, member: &mut Member, debug: bool) {
        apply_tokens(member, &self.tokens, StepOptions::new().debug(debug));
    }
}

fn parse_token(token: &str) -> Result<Token> {
    match token {
        "ptr" => return Ok(Token::Pointer { allow_null: false }),
        "ptr0" => return Ok(Token::Pointer { allow_null: true }),
        "str" => return Ok(Token::String),
        _ => {}
    }

    if let Some(inner) = token.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
        let inner = inner.trim();
        if inner.is_empty() {
            bail!("array step '{}' needs a count or a field name", token);
        }
        let length = match inner.parse::<usize>() {
            Ok(count) => ArrayLength::Fixed(count),
            Err(_) => ArrayLength::Field(inner.to_string()),
        };
        return Ok(Token::Array(length));
    }

    let (kind, endian) = if let Some(kind) = token.strip_suffix("be") {
        (kind, Endian::Big)
    } else if let Some(kind) = token.strip_suffix("le") {
        (kind, Endian::Little)
    } else {
        (token, Endian::Little)
    };

    let primitive = match kind {
        "i8" => Primitive::I8,
        "u8" => Primitive::U8,
        "i16" => Primitive::I16,
        "u16" => Primitive::U16,
        "i32" => Primitive::I32,
        "u32" => Primitive::U32,
        "i64" => Primitive::I64,
        "u64" => Primitive::U64,
        "f32" => Primitive::F32,
        "f64" => Primitive::F64,
        _ => bail!("unknown step '{}'", token),
    };

    Ok(Token::Primitive(primitive, endian))
}

/// Value steps end a chain; an array needs an element chain after it
fn check_chain(name: &str, tokens: &[Token]) -> Result<()> {
    for (i, token) in tokens.iter().enumerate() {
        let last = i + 1 == tokens.len();
        match token {
            Token::Primitive(..) | Token::String if !last => {
                bail!("field '{}': nothing may follow a value step", name)
            }
            Token::Array(_) if last => {
                bail!("field '{}': array needs an element chain", name)
            }
            _ => {}
        }
    }
    Ok(())
}

fn apply_tokens(member: &mut Member, tokens: &[Token], options: StepOptions) {
    let Some((first, rest)) = tokens.split_first() else {
        return;
    };

    match first {
        Token::Primitive(kind, endian) => member.read(*kind, options.endian(*endian)),
        Token::String => member.string_with(options),
        Token::Pointer { allow_null } => {
            let member = member.pointer_with(options.allow_null_pointer(*allow_null));
            apply_tokens(member, rest, options)
        }
        Token::Array(length) => {
            let element = member.array_with(length.clone(), options);
            apply_tokens(element, rest, options)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use binform_core::Step;

    #[test]
    fn test_parse_primitive() {
        let def = FieldDef::parse("magic=u32be").unwrap();
        assert_eq!(def.name, "magic");
        assert_eq!(def.tokens, vec![Token::Primitive(Primitive::U32, Endian::Big)]);
    }

    #[test]
    fn test_parse_pointer_chain() {
        let def = FieldDef::parse("names = [count]:ptr:str").unwrap();
        assert_eq!(def.name, "names");
        assert_eq!(
            def.tokens,
            vec![
                Token::Array(ArrayLength::Field("count".to_string())),
                Token::Pointer { allow_null: false },
                Token::String,
            ]
        );
    }

    #[test]
    fn test_parse_fixed_array() {
        let def = FieldDef::parse("values=[4]:u8").unwrap();
        assert_eq!(def.tokens[0], Token::Array(ArrayLength::Fixed(4)));
    }

    #[test]
    fn test_pointer_may_end_chain() {
        assert!(FieldDef::parse("next=ptr0").is_ok());
    }

    #[test]
    fn test_rejects_bad_definitions() {
        assert!(FieldDef::parse("no-equals").is_err());
        assert!(FieldDef::parse("=u8").is_err());
        assert!(FieldDef::parse("x=u12").is_err());
        assert!(FieldDef::parse("x=u8:u8").is_err());
        assert!(FieldDef::parse("x=str:ptr").is_err());
        assert!(FieldDef::parse("x=[4]").is_err());
        assert!(FieldDef::parse("x=[]:u8").is_err());
    }

    #[test]
    fn test_apply_builds_steps() {
        let def = FieldDef::parse("names=[2]:ptr:str").unwrap();
        let mut member = Member::new("names");
        def.apply(&mut member, true);

        assert_eq!(member.steps().len(), 1);
        let Step::Array { element, options, .. } = &member.steps()[0] else {
            panic!("expected an array step");
        };
        assert!(options.debug);
        assert_eq!(element.steps().len(), 2);
        assert_eq!(element.steps()[0].kind_str(), "pointer");
        assert_eq!(element.steps()[1].kind_str(), "string");
    }
}
