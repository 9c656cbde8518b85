use std::collections::HashMap;
use std::path::Path;

use alloy::dyn_abi::{DynSolType, DynSolValue};
use alloy::json_abi::JsonAbi;
use alloy::primitives::{Address, B256, I256, U256};

use super::event_parsing::{EventParseError, EventParam, ParsedEvent, TupleFieldInfo};
use crate::rpc::RawLog;

/// topic0 to the event it identifies
pub type TopicSignatureMap = HashMap<B256, ParsedEvent>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedValue {
    Address(Address),
    Uint(U256),
    Int(I256),
    Bool(bool),
    Bytes32(B256),
    Bytes(Vec<u8>),
    String(String),
    /// Named tuple of (field_name, field_value) pairs
    NamedTuple(Vec<(String, DecodedValue)>),
    Array(Vec<DecodedValue>),
}

impl DecodedValue {
    pub fn as_address(&self) -> Option<Address> {
        match self {
            DecodedValue::Address(addr) => Some(*addr),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedField {
    pub name: String,
    pub value: DecodedValue,
}

/// A log decoded against the contract interface. Fields keep declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedEvent {
    pub name: String,
    pub address: Address,
    pub data: Vec<DecodedField>,
}

impl DecodedEvent {
    pub fn field(&self, position: usize) -> Option<&DecodedValue> {
        self.data.get(position).map(|f| &f.value)
    }
}

#[derive(Debug, Clone)]
pub struct EventDecoder {
    events: TopicSignatureMap,
}

impl EventDecoder {
    pub fn new(events: impl IntoIterator<Item = ParsedEvent>) -> Self {
        let events = events
            .into_iter()
            .inspect(|e| tracing::debug!("Decoding {} as topic {}", e.signature, e.topic0))
            .map(|e| (e.topic0, e))
            .collect();
        Self { events }
    }

    pub fn from_signatures<S: AsRef<str>>(signatures: &[S]) -> Result<Self, EventParseError> {
        let events = signatures
            .iter()
            .map(|s| ParsedEvent::from_signature(s.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(events))
    }

    /// Anonymous events carry no topic0 and are left out of the map.
    pub fn from_abi(abi: &JsonAbi) -> Result<Self, EventParseError> {
        let events = abi
            .events()
            .filter(|e| !e.anonymous)
            .map(ParsedEvent::from_abi_event)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(events))
    }

    pub fn from_abi_file(path: &Path) -> Result<Self, EventParseError> {
        let load_err = |message: String| EventParseError::AbiLoad {
            path: path.display().to_string(),
            message,
        };

        let content = std::fs::read_to_string(path).map_err(|e| load_err(e.to_string()))?;
        let abi: JsonAbi = serde_json::from_str(&content).map_err(|e| load_err(e.to_string()))?;

        Self::from_abi(&abi)
    }

    pub fn topic_map(&self) -> &TopicSignatureMap {
        &self.events
    }

    /// Decode every log that matches a known event. Anything else is dropped.
    pub fn decode(&self, logs: &[RawLog]) -> Vec<DecodedEvent> {
        logs.iter().filter_map(|log| self.decode_log(log)).collect()
    }

    pub fn decode_log(&self, log: &RawLog) -> Option<DecodedEvent> {
        let topic0 = log.topics.first()?;
        let event = self.events.get(topic0)?;

        match decode_with(event, log) {
            Ok(data) => Some(DecodedEvent {
                name: event.name.clone(),
                address: log.address,
                data,
            }),
            Err(reason) => {
                tracing::debug!(
                    "Skipping {} log from {}: {}",
                    event.name,
                    log.address,
                    reason
                );
                None
            }
        }
    }
}

fn decode_with(event: &ParsedEvent, log: &RawLog) -> Result<Vec<DecodedField>, String> {
    let indexed_count = event.params.iter().filter(|p| p.indexed).count();
    if log.topics.len() < indexed_count + 1 {
        return Err(format!(
            "expected {} topics, got {}",
            indexed_count + 1,
            log.topics.len()
        ));
    }

    let data_params = event.data_params();
    let mut data_values = if data_params.is_empty() {
        Vec::new().into_iter()
    } else {
        let data_types = data_params.iter().map(|p| p.param_type.clone()).collect();
        match DynSolType::Tuple(data_types).abi_decode_params(&log.data) {
            Ok(DynSolValue::Tuple(values)) => values.into_iter(),
            Ok(other) => return Err(format!("unexpected data layout {:?}", other)),
            Err(e) => return Err(e.to_string()),
        }
    };

    // topic[0] is the event signature
    let mut topics = log.topics[1..].iter();
    let mut fields = Vec::with_capacity(event.params.len());

    for (i, param) in event.params.iter().enumerate() {
        let value = if param.indexed {
            let topic = topics.next().ok_or("ran out of topics")?;
            decode_topic(topic, &param.param_type)
        } else {
            let value = data_values.next().ok_or("ran out of data values")?;
            convert_with_field_names(&value, param.tuple_fields.as_ref())?
        };

        fields.push(DecodedField {
            name: field_name(param, i),
            value,
        });
    }

    Ok(fields)
}

fn field_name(param: &EventParam, position: usize) -> String {
    if param.name.is_empty() {
        format!("param_{}", position)
    } else {
        param.name.clone()
    }
}

/// Indexed values of dynamic or composite types are stored as their keccak hash.
fn decode_topic(topic: &B256, param_type: &DynSolType) -> DecodedValue {
    match param_type {
        DynSolType::Address => DecodedValue::Address(Address::from_word(*topic)),
        DynSolType::Uint(_) => DecodedValue::Uint(U256::from_be_bytes(topic.0)),
        DynSolType::Int(_) => DecodedValue::Int(I256::from_be_bytes(topic.0)),
        DynSolType::Bool => DecodedValue::Bool(topic[31] != 0),
        _ => DecodedValue::Bytes32(*topic),
    }
}

fn convert_with_field_names(
    value: &DynSolValue,
    tuple_fields: Option<&TupleFieldInfo>,
) -> Result<DecodedValue, String> {
    match (value, tuple_fields) {
        (DynSolValue::Tuple(values), Some(TupleFieldInfo::Tuple(field_infos))) => {
            let named = field_infos
                .iter()
                .zip(values.iter())
                .map(|((name, info), v)| Ok((name.clone(), convert_with_field_names(v, Some(info))?)))
                .collect::<Result<Vec<_>, String>>()?;
            Ok(DecodedValue::NamedTuple(named))
        }
        _ => convert_dyn_sol_value(value),
    }
}

fn convert_dyn_sol_value(value: &DynSolValue) -> Result<DecodedValue, String> {
    match value {
        DynSolValue::Address(addr) => Ok(DecodedValue::Address(*addr)),
        DynSolValue::Uint(val, _) => Ok(DecodedValue::Uint(*val)),
        DynSolValue::Int(val, _) => Ok(DecodedValue::Int(*val)),
        DynSolValue::Bool(b) => Ok(DecodedValue::Bool(*b)),
        DynSolValue::FixedBytes(word, 32) => Ok(DecodedValue::Bytes32(*word)),
        DynSolValue::FixedBytes(word, size) => Ok(DecodedValue::Bytes(word[..*size].to_vec())),
        DynSolValue::Bytes(bytes) => Ok(DecodedValue::Bytes(bytes.clone())),
        DynSolValue::String(s) => Ok(DecodedValue::String(s.clone())),
        DynSolValue::Tuple(values) => {
            let named = values
                .iter()
                .enumerate()
                .map(|(i, v)| Ok((format!("field_{}", i), convert_dyn_sol_value(v)?)))
                .collect::<Result<Vec<_>, String>>()?;
            Ok(DecodedValue::NamedTuple(named))
        }
        DynSolValue::Array(values) | DynSolValue::FixedArray(values) => Ok(DecodedValue::Array(
            values
                .iter()
                .map(convert_dyn_sol_value)
                .collect::<Result<Vec<_>, String>>()?,
        )),
        _ => Err(format!("unsupported value type: {:?}", value)),
    }
}
