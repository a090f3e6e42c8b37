use std::fs;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use framer::{ChannelKey, Codec, DataType, FramerConfig, Series, TimeStamp, codec::Flags};

use super::{
    error::DispatchError,
    model::{CliCommands, DecodeArgs, FlagsArgs},
};

#[derive(Serialize, Debug)]
struct SeriesSummary {
    key: ChannelKey,
    data_type: DataType,
    len: usize,
    time_range: [i64; 2],
    alignment: [u64; 2],
    #[serde(skip_serializing_if = "Option::is_none")]
    values: Option<Value>,
}

pub fn dispatch(cmd: CliCommands, cfg: &FramerConfig) -> Result<String, DispatchError> {
    match cmd {
        CliCommands::Decode(args) => handle_decode(args, cfg),
        CliCommands::Flags(args) => handle_flags(args),
    }
}

fn handle_decode(args: DecodeArgs, cfg: &FramerConfig) -> Result<String, DispatchError> {
    let codec = Codec::from_channels(&cfg.channels);
    let frame = codec.decode(fs::read(&args.file)?)?;
    debug!(series = frame.len(), "decoded {}", args.file.display());

    let mut summaries = Vec::with_capacity(frame.len());
    for (key, series) in frame.iter() {
        let bounds = series.alignment_bounds();
        summaries.push(SeriesSummary {
            key,
            data_type: series.data_type(),
            len: series.len(),
            time_range: [series.time_range().start.0, series.time_range().end.0],
            alignment: [bounds.lower.0, bounds.upper.0],
            values: match args.values {
                true => Some(values_json(series)?),
                false => None,
            },
        });
    }
    Ok(serde_json::to_string(&summaries)?)
}

fn handle_flags(args: FlagsArgs) -> Result<String, DispatchError> {
    let bytes = fs::read(&args.file)?;
    let first = bytes.first().ok_or(DispatchError::EmptyFile)?;
    Ok(serde_json::to_string(&Flags::decode(*first))?)
}

fn values_json(series: &Series) -> Result<Value, serde_json::Error> {
    match series.data_type() {
        DataType::Float64 => serde_json::to_value(series.values::<f64>()),
        DataType::Float32 => serde_json::to_value(series.values::<f32>()),
        DataType::Int64 => serde_json::to_value(series.values::<i64>()),
        DataType::Int32 => serde_json::to_value(series.values::<i32>()),
        DataType::Int16 => serde_json::to_value(series.values::<i16>()),
        DataType::Int8 => serde_json::to_value(series.values::<i8>()),
        DataType::Uint64 => serde_json::to_value(series.values::<u64>()),
        DataType::Uint32 => serde_json::to_value(series.values::<u32>()),
        DataType::Uint16 => serde_json::to_value(series.values::<u16>()),
        DataType::Uint8 => serde_json::to_value(series.values::<u8>()),
        DataType::TimeStamp => serde_json::to_value(series.values::<TimeStamp>()),
        // hex, json numbers stop at 64 bits
        DataType::Uuid => serde_json::to_value(
            series
                .values::<u128>()
                .map(|v| v.iter().map(|u| format!("{u:032x}")).collect::<Vec<_>>()),
        ),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use framer::{Channel, Frame, TimeRange};

    fn config() -> FramerConfig {
        FramerConfig {
            channels: vec![
                Channel {
                    key: 1,
                    name: "time".to_string(),
                    data_type: DataType::TimeStamp,
                    index: Some(1),
                },
                Channel {
                    key: 2,
                    name: "temp".to_string(),
                    data_type: DataType::Float32,
                    index: Some(1),
                },
            ],
            ..Default::default()
        }
    }

    fn write_frame(name: &str, cfg: &FramerConfig) -> PathBuf {
        let tr = TimeRange::new(10, 13);
        let mut frame = Frame::new();
        let stamps = [TimeStamp(10), TimeStamp(11), TimeStamp(12)];
        frame.push(1, Series::from_values(&stamps, tr));
        frame.push(2, Series::from_values(&[20.5f32, 21.0, 21.5], tr));
        let bytes = Codec::from_channels(&cfg.channels).encode(&frame).unwrap();

        let path = std::env::temp_dir().join(format!("framer_{}_{name}.bin", std::process::id()));
        fs::write(&path, &bytes).unwrap();
        path
    }

    #[test]
    fn test_decode() {
        let cfg = config();
        let file = write_frame("decode", &cfg);
        let args = DecodeArgs {
            file: file.clone(),
            values: true,
        };
        let out = dispatch(CliCommands::Decode(args), &cfg).unwrap();
        fs::remove_file(file).unwrap();

        let out: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(out[0]["key"], 1);
        assert_eq!(out[0]["len"], 3);
        assert_eq!(out[0]["values"][2], 12);
        assert_eq!(out[1]["data_type"], "Float32");
        assert_eq!(out[1]["time_range"][1], 13);
        assert_eq!(out[1]["values"][0], 20.5);
        // alignment is not carried on the wire
        assert_eq!(out[1]["alignment"], serde_json::json!([0, 3]));
    }

    #[test]
    fn test_flags() {
        let cfg = config();
        let file = write_frame("flags", &cfg);
        let args = FlagsArgs { file: file.clone() };
        let out = dispatch(CliCommands::Flags(args), &cfg).unwrap();
        fs::remove_file(file).unwrap();

        assert_eq!(out, r#"{"size":true,"align":true,"channel":true}"#);
    }

    #[test]
    fn test_decode_without_channels() {
        let cfg = config();
        let file = write_frame("unconfigured", &cfg);
        let args = DecodeArgs {
            file: file.clone(),
            values: false,
        };
        let res = dispatch(CliCommands::Decode(args), &FramerConfig::default());
        fs::remove_file(file).unwrap();
        assert!(matches!(res, Err(DispatchError::Codec(_))));
    }
}
