//! Dynamic message codec
//!
//! A tonic codec over `prost_reflect::DynamicMessage`, so the server can
//! frame any method's messages from descriptors discovered at runtime.

use prost::Message;
use prost_reflect::{DynamicMessage, MessageDescriptor};
use tonic::codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder};
use tonic::Status;

/// Codec for one method
///
/// Encoded messages carry their own descriptor, so only the decode side
/// needs one: the input type on the server, the output type on a client.
#[derive(Debug, Clone)]
pub struct DynamicCodec {
    decode: MessageDescriptor,
}

impl DynamicCodec {
    /// Build a server-side codec from the method's descriptors
    pub fn new(input: MessageDescriptor, _output: MessageDescriptor) -> Self {
        Self { decode: input }
    }

    /// Build a client-side codec (encode input, decode output)
    pub fn client(_input: MessageDescriptor, output: MessageDescriptor) -> Self {
        Self { decode: output }
    }
}

impl Codec for DynamicCodec {
    type Encode = DynamicMessage;
    type Decode = DynamicMessage;
    type Encoder = DynamicEncoder;
    type Decoder = DynamicDecoder;

    fn encoder(&mut self) -> Self::Encoder {
        DynamicEncoder
    }

    fn decoder(&mut self) -> Self::Decoder {
        DynamicDecoder(self.decode.clone())
    }
}

/// Encodes dynamic messages into the response frame
#[derive(Debug)]
pub struct DynamicEncoder;

impl Encoder for DynamicEncoder {
    type Item = DynamicMessage;
    type Error = Status;

    fn encode(&mut self, item: Self::Item, dst: &mut EncodeBuf<'_>) -> Result<(), Self::Error> {
        item.encode(dst)
            .map_err(|e| Status::internal(format!("message encode failed: {e}")))
    }
}

/// Decodes request frames into dynamic messages
#[derive(Debug)]
pub struct DynamicDecoder(MessageDescriptor);

impl Decoder for DynamicDecoder {
    type Item = DynamicMessage;
    type Error = Status;

    fn decode(&mut self, src: &mut DecodeBuf<'_>) -> Result<Option<Self::Item>, Self::Error> {
        let message = DynamicMessage::decode(self.0.clone(), src)
            .map_err(|e| Status::invalid_argument(format!("message decode failed: {e}")))?;
        Ok(Some(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::GrpcSchema;
    use std::io::Write;

    #[test]
    fn encode_decode_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("greeter.proto");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(crate::proto::GREETER_PROTO.as_bytes())
            .unwrap();
        let schema = GrpcSchema::from_file(path.to_str().unwrap()).unwrap();
        let method = schema.method("demo.greeter.Greeter", "SayHello").unwrap();

        let mut request = DynamicMessage::new(method.input());
        request.set_field_by_name("name", prost_reflect::Value::String("mockd".into()));
        let bytes = request.encode_to_vec();

        let decoded = DynamicMessage::decode(method.input(), bytes.as_slice()).unwrap();
        assert_eq!(
            decoded.get_field_by_name("name").unwrap().as_str(),
            Some("mockd")
        );
    }
}
