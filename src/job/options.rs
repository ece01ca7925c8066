use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EncoderKind {
    #[default]
    X264,
    X265,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EncoderArch {
    X86,
    #[default]
    X64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EncoderVariant {
    #[default]
    Bit8,
    Bit10,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RateControl {
    #[default]
    Crf,
    Cqp,
    Abr,
    TwoPass,
}

impl RateControl {
    /// 是否為需要統計檔的多次編碼模式
    #[must_use]
    pub const fn is_multi_pass(self) -> bool {
        matches!(self, Self::TwoPass)
    }

    #[must_use]
    pub const fn uses_bitrate(self) -> bool {
        matches!(self, Self::Abr | Self::TwoPass)
    }
}

macro_rules! impl_name_conversions {
    ($ty:ty { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            #[must_use]
            pub const fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => $name),+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }

        impl FromStr for $ty {
            type Err = anyhow::Error;

            fn from_str(value: &str) -> Result<Self> {
                match value {
                    $($name => Ok(Self::$variant),)+
                    other => Err(anyhow!("未知的 {} 值: {other}", stringify!($ty))),
                }
            }
        }
    };
}

impl_name_conversions!(EncoderKind { X264 => "x264", X265 => "x265" });
impl_name_conversions!(EncoderArch { X86 => "x86", X64 => "x64" });
impl_name_conversions!(EncoderVariant { Bit8 => "8bit", Bit10 => "10bit" });
impl_name_conversions!(RateControl { Crf => "CRF", Cqp => "CQ", Abr => "ABR", TwoPass => "2-Pass" });

/// 編碼選項快照
///
/// 送出工作時會複製一份，之後介面上的修改不會影響已送出的工作。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodingOptions {
    pub encoder: EncoderKind,
    pub arch: EncoderArch,
    pub variant: EncoderVariant,
    pub rate_control: RateControl,
    /// CRF / CQ 模式使用的量化值
    pub quantizer: f64,
    /// ABR / 2-Pass 模式使用的位元率 (kbps)
    pub bitrate: u32,
    pub preset: String,
    pub tune: String,
    pub profile: String,
    pub custom_encoder_args: String,
    pub custom_source_args: String,
}

impl Default for EncodingOptions {
    fn default() -> Self {
        Self {
            encoder: EncoderKind::X264,
            arch: EncoderArch::X64,
            variant: EncoderVariant::Bit8,
            rate_control: RateControl::Crf,
            quantizer: 22.0,
            bitrate: 2000,
            preset: "medium".to_string(),
            tune: String::new(),
            profile: String::new(),
            custom_encoder_args: String::new(),
            custom_source_args: String::new(),
        }
    }
}

impl EncodingOptions {
    /// 位元率控制摘要，例如 `CRF@22.0` 或 `2-Pass@2500 kbps`
    #[must_use]
    pub fn rate_control_summary(&self) -> String {
        if self.rate_control.uses_bitrate() {
            format!("{}@{} kbps", self.rate_control, self.bitrate)
        } else {
            format!("{}@{:.1}", self.rate_control, self.quantizer)
        }
    }

    /// 攤平成 key/value，供佇列保存使用
    #[must_use]
    pub fn to_flat_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        map.insert("encoder".to_string(), self.encoder.to_string());
        map.insert("arch".to_string(), self.arch.to_string());
        map.insert("variant".to_string(), self.variant.to_string());
        map.insert("rate_control".to_string(), self.rate_control.to_string());
        map.insert("quantizer".to_string(), self.quantizer.to_string());
        map.insert("bitrate".to_string(), self.bitrate.to_string());
        map.insert("preset".to_string(), self.preset.clone());
        map.insert("tune".to_string(), self.tune.clone());
        map.insert("profile".to_string(), self.profile.clone());
        map.insert(
            "custom_encoder_args".to_string(),
            self.custom_encoder_args.clone(),
        );
        map.insert(
            "custom_source_args".to_string(),
            self.custom_source_args.clone(),
        );
        map
    }

    /// 從攤平的 key/value 還原，缺少的欄位使用預設值
    pub fn from_flat_map(map: &BTreeMap<String, String>) -> Result<Self> {
        let mut options = Self::default();

        for (key, value) in map {
            match key.as_str() {
                "encoder" => options.encoder = value.parse()?,
                "arch" => options.arch = value.parse()?,
                "variant" => options.variant = value.parse()?,
                "rate_control" => options.rate_control = value.parse()?,
                "quantizer" => {
                    options.quantizer = value
                        .parse()
                        .with_context(|| format!("無法解析 quantizer: {value}"))?;
                }
                "bitrate" => {
                    options.bitrate = value
                        .parse()
                        .with_context(|| format!("無法解析 bitrate: {value}"))?;
                }
                "preset" => options.preset.clone_from(value),
                "tune" => options.tune.clone_from(value),
                "profile" => options.profile.clone_from(value),
                "custom_encoder_args" => options.custom_encoder_args.clone_from(value),
                "custom_source_args" => options.custom_source_args.clone_from(value),
                unknown => log::debug!("忽略未知的編碼選項欄位: {unknown}"),
            }
        }

        Ok(options)
    }
}

/// 以類似 shell 的方式切割自訂參數，雙引號內的空白不切割
#[must_use]
pub fn split_custom_args(raw: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut has_token = false;

    for ch in raw.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                has_token = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if has_token {
                    args.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            c => {
                current.push(c);
                has_token = true;
            }
        }
    }

    if has_token {
        args.push(current);
    }

    args
}
