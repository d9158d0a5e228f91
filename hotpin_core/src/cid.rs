//! Content identifiers as handed out by the storage node.
//!
//! Binary layout: `[CID_VERSION, codec, MULTIHASH_BLAKE3, hash(32)]`.
//! The canonical text form is the multibase base32-lower encoding of those
//! bytes, which is also what the ledger uses inside its store keys.

use crate::Hash;
use minicbor::{Decode, Decoder, Encode, Encoder, encode::Write};
use std::fmt;
use std::str::FromStr;

const CID_VERSION: u8 = 0x01;
const MULTIHASH_BLAKE3: u8 = 0x1e;
const CID_LEN: usize = 3 + Hash::SIZE;

#[derive(thiserror::Error, Debug)]
pub enum ContentIdError {
    #[error("invalid multibase string: {0}")]
    Multibase(#[from] multibase::Error),
    #[error("invalid length: expected 35 bytes, got {0}")]
    InvalidLength(usize),
    #[error("invalid version: expected {0:#x}, got {1:#x}")]
    InvalidVersion(u8, u8),
    #[error("unknown codec {0:#x}")]
    UnknownCodec(u8),
    #[error("invalid multihash type: expected {0:#x}, got {1:#x}")]
    InvalidMultihashType(u8, u8),
}

/// How the node interprets the bytes behind a content identifier.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum Codec {
    /// A single opaque blob.
    Raw,
    /// Root of a DAG whose children are pinned recursively with it.
    DagCbor,
}

impl Codec {
    pub fn to_byte(self) -> u8 {
        match self {
            Codec::Raw => 0x55,
            Codec::DagCbor => 0x71,
        }
    }

    pub fn from_byte(b: u8) -> Result<Self, ContentIdError> {
        match b {
            0x55 => Ok(Codec::Raw),
            0x71 => Ok(Codec::DagCbor),
            other => Err(ContentIdError::UnknownCodec(other)),
        }
    }
}

/// Identifier of a content-addressed object held by the storage node.
///
/// Equality, hashing and ordering are structural over `(codec, hash)`, never
/// over the text form.
///
/// ```
/// use hotpin_core::{ContentId, Hash};
///
/// let id = ContentId::raw(Hash::new(b"hello"));
/// let parsed: ContentId = id.to_string().parse().unwrap();
/// assert_eq!(parsed, id);
/// ```
#[derive(Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ContentId {
    pub codec: Codec,
    pub hash: Hash,
}

impl fmt::Debug for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ContentId").field(&self.to_base32()).finish()
    }
}

impl ContentId {
    pub fn new(codec: Codec, hash: Hash) -> Self {
        Self { codec, hash }
    }

    /// Identifier of a raw blob with the given hash.
    pub fn raw(hash: Hash) -> Self {
        Self::new(Codec::Raw, hash)
    }

    /// Identifier the node assigns to `data` when it is added as one blob.
    pub fn for_raw_bytes(data: impl AsRef<[u8]>) -> Self {
        Self::raw(Hash::new(data))
    }

    pub fn parse(s: &str) -> Result<Self, ContentIdError> {
        let (_, bytes) = multibase::decode(s)?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ContentIdError> {
        if bytes.len() != CID_LEN {
            return Err(ContentIdError::InvalidLength(bytes.len()));
        }
        if bytes[0] != CID_VERSION {
            return Err(ContentIdError::InvalidVersion(CID_VERSION, bytes[0]));
        }
        let codec = Codec::from_byte(bytes[1])?;
        if bytes[2] != MULTIHASH_BLAKE3 {
            return Err(ContentIdError::InvalidMultihashType(
                MULTIHASH_BLAKE3,
                bytes[2],
            ));
        }
        let hash: [u8; 32] = bytes[3..]
            .try_into()
            .map_err(|_| ContentIdError::InvalidLength(bytes.len()))?;
        Ok(Self::new(codec, hash.into()))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(CID_LEN);
        out.extend_from_slice(&[CID_VERSION, self.codec.to_byte(), MULTIHASH_BLAKE3]);
        out.extend_from_slice(self.hash.as_bytes());
        out
    }

    pub fn to_base32(&self) -> String {
        multibase::encode(multibase::Base::Base32Lower, self.to_bytes())
    }

    pub fn to_base58(&self) -> String {
        multibase::encode(multibase::Base::Base58Btc, self.to_bytes())
    }

    pub fn fmt_short(&self) -> String {
        self.hash.fmt_short()
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base32())
    }
}

impl FromStr for ContentId {
    type Err = ContentIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContentId::parse(s)
    }
}

impl<C> Encode<C> for ContentId {
    fn encode<W: Write>(
        &self,
        e: &mut Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.bytes(&self.to_bytes())?;
        Ok(())
    }
}

impl<'b, C> Decode<'b, C> for ContentId {
    fn decode(d: &mut Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let p = d.position();
        let bytes = d.bytes()?;
        ContentId::from_bytes(bytes)
            .map_err(|_| minicbor::decode::Error::message("invalid content id").at(p))
    }
}

impl serde::Serialize for ContentId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for ContentId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ContentId::parse(&s).map_err(serde::de::Error::custom)
    }
}
