//! ABI calldata encoding and return-data decoding.
//!
//! Calldata is `selector(4 bytes) || abi_encode_params(args)` where the
//! selector is the first four bytes of `keccak256(signature)`. Return data is
//! decoded against a declared output type list. Pure functions, no I/O.

use alloy::dyn_abi::{DynSolType, DynSolValue};
use alloy::primitives::{keccak256, Address, Bytes, B256, U256};

use crate::blockchain::types::{BlockchainError, BlockchainResult};

/// First four bytes of the keccak hash of a canonical function signature.
pub fn function_selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    let mut selector = [0u8; 4];
    selector.copy_from_slice(&hash[..4]);
    selector
}

fn parse_types(types: &[&str]) -> BlockchainResult<Vec<DynSolType>> {
    types
        .iter()
        .map(|ty| {
            DynSolType::parse(ty)
                .map_err(|e| BlockchainError::InvalidInput(format!("invalid ABI type '{}': {}", ty, e)))
        })
        .collect()
}

/// ABI-encode `args` as a parameter tuple of `arg_types`, without selector.
pub fn encode_params(arg_types: &[&str], args: Vec<DynSolValue>) -> BlockchainResult<Vec<u8>> {
    if arg_types.len() != args.len() {
        return Err(BlockchainError::InvalidInput(format!(
            "expected {} arguments, got {}",
            arg_types.len(),
            args.len()
        )));
    }

    let types = parse_types(arg_types)?;
    for (i, (ty, arg)) in types.iter().zip(args.iter()).enumerate() {
        if !ty.matches(arg) {
            return Err(BlockchainError::InvalidInput(format!(
                "argument {} does not match type {}",
                i, arg_types[i]
            )));
        }
    }

    Ok(DynSolValue::Tuple(args).abi_encode_params())
}

/// Encode a function call to calldata.
pub fn encode_calldata(
    signature: &str,
    arg_types: &[&str],
    args: Vec<DynSolValue>,
) -> BlockchainResult<Bytes> {
    let params = encode_params(arg_types, args)?;
    let mut calldata = Vec::with_capacity(4 + params.len());
    calldata.extend_from_slice(&function_selector(signature));
    calldata.extend_from_slice(&params);
    Ok(calldata.into())
}

/// Decode a `0x`-prefixed hex return payload.
///
/// An empty payload (`0x`) decodes to the empty tuple regardless of the
/// declared outputs; callers that need values fail when reading them.
pub fn decode_output(output_hex: &str, out_types: &[&str]) -> BlockchainResult<Vec<DynSolValue>> {
    let stripped = output_hex.strip_prefix("0x").ok_or_else(|| {
        BlockchainError::Decode(format!("invalid output hex: {:?}", output_hex))
    })?;
    let data = alloy::hex::decode(stripped).map_err(|e| BlockchainError::decode("invalid output hex", e))?;
    decode_params(&data, out_types)
}

/// Decode raw ABI bytes against `out_types`.
pub fn decode_params(data: &[u8], out_types: &[&str]) -> BlockchainResult<Vec<DynSolValue>> {
    if data.is_empty() {
        return Ok(Vec::new());
    }

    let tuple = DynSolType::Tuple(parse_types(out_types)?);
    match tuple.abi_decode_params(data) {
        Ok(DynSolValue::Tuple(values)) => Ok(values),
        Ok(other) => Ok(vec![other]),
        Err(e) => Err(BlockchainError::decode("ABI decode failed", e)),
    }
}

/// Sequential typed reader over a decoded return tuple.
#[derive(Debug)]
pub struct Decoded {
    values: std::vec::IntoIter<DynSolValue>,
    position: usize,
}

impl Decoded {
    pub fn new(values: Vec<DynSolValue>) -> Self {
        Self {
            values: values.into_iter(),
            position: 0,
        }
    }

    /// Decode `output_hex` and wrap the result.
    pub fn from_hex(output_hex: &str, out_types: &[&str]) -> BlockchainResult<Self> {
        decode_output(output_hex, out_types).map(Self::new)
    }

    fn next_value(&mut self, expected: &str) -> BlockchainResult<DynSolValue> {
        let idx = self.position;
        self.position += 1;
        self.values.next().ok_or_else(|| {
            BlockchainError::Decode(format!("missing output {} (expected {})", idx, expected))
        })
    }

    fn mismatch(&self, expected: &str) -> BlockchainError {
        BlockchainError::Decode(format!(
            "output {} is not a {}",
            self.position.saturating_sub(1),
            expected
        ))
    }

    pub fn address(&mut self) -> BlockchainResult<Address> {
        let value = self.next_value("address")?;
        value.as_address().ok_or_else(|| self.mismatch("address"))
    }

    pub fn boolean(&mut self) -> BlockchainResult<bool> {
        let value = self.next_value("bool")?;
        value.as_bool().ok_or_else(|| self.mismatch("bool"))
    }

    pub fn string(&mut self) -> BlockchainResult<String> {
        let value = self.next_value("string")?;
        value
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| self.mismatch("string"))
    }

    pub fn uint(&mut self) -> BlockchainResult<U256> {
        let value = self.next_value("uint")?;
        value
            .as_uint()
            .map(|(v, _)| v)
            .ok_or_else(|| self.mismatch("uint"))
    }

    pub fn u64(&mut self) -> BlockchainResult<u64> {
        let value = self.uint()?;
        u64::try_from(value).map_err(|_| BlockchainError::Decode(format!("{} overflows u64", value)))
    }

    pub fn u8(&mut self) -> BlockchainResult<u8> {
        let value = self.uint()?;
        u8::try_from(value).map_err(|_| BlockchainError::Decode(format!("{} overflows u8", value)))
    }

    pub fn bytes32(&mut self) -> BlockchainResult<B256> {
        let value = self.next_value("bytes32")?;
        match value.as_fixed_bytes() {
            Some((bytes, 32)) => Ok(B256::from_slice(bytes)),
            _ => Err(self.mismatch("bytes32")),
        }
    }
}
