use alloy::dyn_abi::DynSolType;
use alloy::json_abi::{Event, EventParam as AbiEventParam, Param};
use alloy::primitives::{keccak256, B256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventParseError {
    #[error("Invalid event signature: {0}")]
    InvalidSignature(String),
    #[error("Failed to parse type '{0}': {1}")]
    TypeParse(String, String),
    #[error("Missing closing parenthesis")]
    MissingCloseParen,
    #[error("Invalid tuple format: {0}")]
    InvalidTuple(String),
    #[error("Empty tuple field")]
    EmptyField,
    #[error("Failed to load ABI from {path}: {message}")]
    AbiLoad { path: String, message: String },
}

/// Field names of a tuple parameter, nested tuples included
#[derive(Debug, Clone, PartialEq)]
pub enum TupleFieldInfo {
    Leaf,
    Tuple(Vec<(String, TupleFieldInfo)>),
}

#[derive(Debug, Clone)]
pub struct EventParam {
    pub name: String,
    pub param_type: DynSolType,
    pub type_string: String,
    pub indexed: bool,
    /// Named components when the parameter is a tuple
    pub tuple_fields: Option<TupleFieldInfo>,
}

#[derive(Debug, Clone)]
pub struct ParsedEvent {
    pub name: String,
    pub signature: String,
    pub canonical_signature: String,
    pub topic0: B256,
    pub params: Vec<EventParam>,
}

impl ParsedEvent {
    /// Parse a full ABI signature like "Transfer(address indexed from, address indexed to, uint256 value)"
    /// Also supports named tuples like "Swap((address currency0, address currency1) key, uint256 amount)"
    pub fn from_signature(signature: &str) -> Result<Self, EventParseError> {
        let signature = signature.trim();

        let open_paren = signature
            .find('(')
            .ok_or_else(|| EventParseError::InvalidSignature(signature.to_string()))?;

        let name = signature[..open_paren].trim().to_string();
        if name.is_empty() {
            return Err(EventParseError::InvalidSignature(
                "Empty event name".to_string(),
            ));
        }

        let close_paren = find_matching_close_paren(signature, open_paren)
            .ok_or(EventParseError::MissingCloseParen)?;

        let params = parse_params(&signature[open_paren + 1..close_paren])?;

        Ok(Self::assemble(name, signature.to_string(), params))
    }

    /// Build from a JSON ABI event entry. Tuple components keep their names.
    pub fn from_abi_event(event: &Event) -> Result<Self, EventParseError> {
        let params = event
            .inputs
            .iter()
            .map(abi_event_param)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::assemble(
            event.name.clone(),
            event.full_signature(),
            params,
        ))
    }

    fn assemble(name: String, signature: String, params: Vec<EventParam>) -> Self {
        // Canonical form carries types only, no names and no "indexed"
        let type_strings: Vec<&str> = params.iter().map(|p| p.type_string.as_str()).collect();
        let canonical_signature = format!("{}({})", name, type_strings.join(","));
        let topic0 = keccak256(canonical_signature.as_bytes());

        ParsedEvent {
            name,
            signature,
            canonical_signature,
            topic0,
            params,
        }
    }

    pub fn indexed_params(&self) -> Vec<&EventParam> {
        self.params.iter().filter(|p| p.indexed).collect()
    }

    pub fn data_params(&self) -> Vec<&EventParam> {
        self.params.iter().filter(|p| !p.indexed).collect()
    }
}

fn abi_event_param(param: &AbiEventParam) -> Result<EventParam, EventParseError> {
    let type_string = param.selector_type().into_owned();
    let param_type = DynSolType::parse(&type_string)
        .map_err(|e| EventParseError::TypeParse(type_string.clone(), e.to_string()))?;

    let tuple_fields = (!param.components.is_empty())
        .then(|| TupleFieldInfo::Tuple(abi_components(&param.components)));

    Ok(EventParam {
        name: param.name.clone(),
        param_type,
        type_string,
        indexed: param.indexed,
        tuple_fields,
    })
}

fn abi_components(components: &[Param]) -> Vec<(String, TupleFieldInfo)> {
    components
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let name = if c.name.is_empty() {
                format!("field_{}", i)
            } else {
                c.name.clone()
            };
            let info = if c.components.is_empty() {
                TupleFieldInfo::Leaf
            } else {
                TupleFieldInfo::Tuple(abi_components(&c.components))
            };
            (name, info)
        })
        .collect()
}

fn find_matching_close_paren(s: &str, open_pos: usize) -> Option<usize> {
    let mut depth = 0;
    for (i, c) in s[open_pos..].char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open_pos + i);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_params(params_str: &str) -> Result<Vec<EventParam>, EventParseError> {
    let params_str = params_str.trim();
    if params_str.is_empty() {
        return Ok(Vec::new());
    }

    split_top_level(params_str)
        .into_iter()
        .filter(|p| !p.trim().is_empty())
        .map(|p| parse_single_param(p.trim()))
        .collect()
}

/// Parse a single parameter like "address indexed from" or "uint256 value"
fn parse_single_param(param_str: &str) -> Result<EventParam, EventParseError> {
    if param_str.starts_with('(') {
        return parse_tuple_param(param_str);
    }

    let parts: Vec<&str> = param_str.split_whitespace().collect();

    let (type_string, indexed, name) = match parts.as_slice() {
        [] => {
            return Err(EventParseError::InvalidSignature(
                "Empty parameter".to_string(),
            ))
        }
        [ty] => (ty.to_string(), false, String::new()),
        [ty, "indexed"] => (ty.to_string(), true, String::new()),
        [ty, name] => (ty.to_string(), false, name.to_string()),
        [ty, "indexed", name] => (ty.to_string(), true, name.to_string()),
        _ => {
            return Err(EventParseError::InvalidSignature(format!(
                "Invalid parameter format: {}",
                param_str
            )))
        }
    };

    let param_type = DynSolType::parse(&type_string)
        .map_err(|e| EventParseError::TypeParse(type_string.clone(), e.to_string()))?;

    Ok(EventParam {
        name,
        param_type,
        type_string,
        indexed,
        tuple_fields: None,
    })
}

/// Parse "(address currency0, address currency1) indexed poolKey" and friends
fn parse_tuple_param(param_str: &str) -> Result<EventParam, EventParseError> {
    let close_idx = find_matching_close_paren(param_str, 0)
        .ok_or_else(|| EventParseError::InvalidTuple(param_str.to_string()))?;

    let tuple_content = &param_str[1..close_idx];
    let (indexed, name) = parse_indexed_and_name(param_str[close_idx + 1..].trim());

    let (field_info, canonical_types) = parse_tuple_fields(tuple_content)?;
    let type_string = format!("({})", canonical_types.join(","));

    let param_type = DynSolType::parse(&type_string)
        .map_err(|e| EventParseError::TypeParse(type_string.clone(), e.to_string()))?;

    Ok(EventParam {
        name,
        param_type,
        type_string,
        indexed,
        tuple_fields: Some(TupleFieldInfo::Tuple(field_info)),
    })
}

fn parse_indexed_and_name(s: &str) -> (bool, String) {
    let parts: Vec<&str> = s.split_whitespace().collect();

    match parts.as_slice() {
        [] => (false, String::new()),
        ["indexed"] => (true, String::new()),
        ["indexed", name, ..] => (true, name.to_string()),
        [name, ..] => (false, name.to_string()),
    }
}

/// Returns the named field layout and the canonical type of each field
fn parse_tuple_fields(
    content: &str,
) -> Result<(Vec<(String, TupleFieldInfo)>, Vec<String>), EventParseError> {
    let content = content.trim();
    if content.is_empty() {
        return Err(EventParseError::InvalidTuple("empty tuple".to_string()));
    }

    let mut field_info = Vec::new();
    let mut canonical_types = Vec::new();

    for field in split_top_level(content) {
        let field = field.trim();
        if field.is_empty() {
            return Err(EventParseError::EmptyField);
        }

        if field.starts_with('(') {
            let close_idx = find_matching_close_paren(field, 0)
                .ok_or_else(|| EventParseError::InvalidTuple(field.to_string()))?;

            let name = field[close_idx + 1..]
                .split_whitespace()
                .last()
                .ok_or_else(|| {
                    EventParseError::InvalidTuple(format!("tuple field '{}' has no name", field))
                })?
                .to_string();

            let (nested_info, nested_types) = parse_tuple_fields(&field[1..close_idx])?;

            field_info.push((name, TupleFieldInfo::Tuple(nested_info)));
            canonical_types.push(format!("({})", nested_types.join(",")));
        } else {
            let (type_str, name) = match field.split_once(' ') {
                Some((ty, name)) => (ty.trim(), name.trim().to_string()),
                None => (field, String::new()),
            };

            if name.is_empty() {
                return Err(EventParseError::InvalidTuple(format!(
                    "field '{}' must have a name in named tuple",
                    field
                )));
            }

            DynSolType::parse(type_str)
                .map_err(|e| EventParseError::TypeParse(type_str.to_string(), e.to_string()))?;

            field_info.push((name, TupleFieldInfo::Leaf));
            canonical_types.push(type_str.to_string());
        }
    }

    Ok((field_info, canonical_types))
}

/// Split by comma, respecting nested parentheses
fn split_top_level(s: &str) -> Vec<&str> {
    let mut fields = Vec::new();
    let mut depth = 0;
    let mut start = 0;

    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            ',' if depth == 0 => {
                fields.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }

    if start < s.len() {
        fields.push(&s[start..]);
    }

    fields
}
