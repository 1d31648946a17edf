// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use core::fmt;

use serde::{Deserialize, Serialize};

/// The class of work a context is bound to (§3 Context.op_type).
///
/// A context is dedicated to exactly one of these for its whole lifetime;
/// the scheduler partitions contexts into regions keyed in part on this
/// value.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpType {
    #[serde(rename = "compress", alias = "Compress", alias = "COMPRESS")]
    Compress,
    #[serde(rename = "decompress", alias = "Decompress", alias = "DECOMPRESS")]
    Decompress,
    #[serde(rename = "cipher-encrypt", alias = "CipherEncrypt")]
    CipherEncrypt,
    #[serde(rename = "cipher-decrypt", alias = "CipherDecrypt")]
    CipherDecrypt,
}
impl fmt::Display for OpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OpType::Compress => "compress",
            OpType::Decompress => "decompress",
            OpType::CipherEncrypt => "cipher-encrypt",
            OpType::CipherDecrypt => "cipher-decrypt",
        })
    }
}

/// Whether a context serves synchronous (`do_sync`/`do_stream`) or
/// asynchronous (`do_async`/`poll`) requests (§3 Context.mode).
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    #[serde(rename = "sync", alias = "Sync", alias = "SYNC")]
    Sync,
    #[serde(rename = "async", alias = "Async", alias = "ASYNC")]
    Async,
}
impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Mode::Sync => "sync",
            Mode::Async => "async",
        })
    }
}

/// Compression algorithm, carried in descriptor `dw9` low byte (§4.2/§6).
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompAlg {
    #[serde(rename = "zlib", alias = "ZLIB", alias = "Zlib")]
    Zlib,
    #[serde(rename = "gzip", alias = "GZIP", alias = "Gzip")]
    Gzip,
}
impl CompAlg {
    /// Descriptor `dw9` low byte per §6 ("Algorithm codes: ZLIB=2, GZIP=3").
    pub const fn wire_code(self) -> u8 {
        match self {
            CompAlg::Zlib => 0x02,
            CompAlg::Gzip => 0x03,
        }
    }
}
impl fmt::Display for CompAlg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CompAlg::Zlib => "zlib",
            CompAlg::Gzip => "gzip",
        })
    }
}

/// Cipher algorithm, used by `set_key` (§4.6) key-length validation and by
/// the cipher descriptor specialization (§4.7).
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherAlg {
    #[serde(rename = "aes", alias = "AES", alias = "Aes")]
    Aes,
    #[serde(rename = "sm4", alias = "SM4", alias = "Sm4")]
    Sm4,
    #[serde(rename = "3des", alias = "3DES", alias = "ThreeDes")]
    ThreeDes,
    #[serde(rename = "des", alias = "DES", alias = "Des")]
    Des,
}
impl fmt::Display for CipherAlg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CipherAlg::Aes => "aes",
            CipherAlg::Sm4 => "sm4",
            CipherAlg::ThreeDes => "3des",
            CipherAlg::Des => "des",
        })
    }
}

/// Block cipher mode of operation. XTS halves the effective key-length
/// check performed by `set_key` (§4.6).
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherMode {
    #[serde(rename = "ecb", alias = "ECB")]
    Ecb,
    #[serde(rename = "cbc", alias = "CBC")]
    Cbc,
    #[serde(rename = "ctr", alias = "CTR")]
    Ctr,
    #[serde(rename = "xts", alias = "XTS")]
    Xts,
    #[serde(rename = "ofb", alias = "OFB")]
    Ofb,
    #[serde(rename = "cfb", alias = "CFB")]
    Cfb,
}
impl fmt::Display for CipherMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CipherMode::Ecb => "ecb",
            CipherMode::Cbc => "cbc",
            CipherMode::Ctr => "ctr",
            CipherMode::Xts => "xts",
            CipherMode::Ofb => "ofb",
            CipherMode::Cfb => "cfb",
        })
    }
}

/// Whether this call starts a new stream or continues one (§4.2, GLOSSARY).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPos {
    New,
    Old,
}

/// Whether the descriptor carries `STATEFUL` (stream) or `STATELESS`
/// (one-shot) processing (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    Stateless,
    Stateful,
}

/// Whether this descriptor terminates a compression stream or is an
/// intermediate flush (§4.2, GLOSSARY).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushType {
    SyncFlush,
    Finish,
}
