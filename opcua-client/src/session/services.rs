//! Concrete C6 service methods.
//!
//! `CreateSession`/`ActivateSession`/`CloseSession` and `Read` get concrete
//! request/response structs because the spec pins specific behavior to
//! their fields (storing the authentication token, `NodeClass`/`ValueRank`
//! coercion, `BadSessionClosed` tolerance). The remaining named services
//! are thin wrappers over [`Session::call_service`], generic over the
//! caller-supplied parameter/result types from the external UA type
//! dictionary — this façade's job is the five-step recipe, not modeling
//! every service's wire layout.

use opcua_core::binary::{BinaryDecodable, BinaryEncodable, CodecError, Decoder, Encoder};
use opcua_core::messages::{status_from_raw, ResponseHeader};
use opcua_core::StatusCode;

use super::{process_service_result, Session};

// Request type tags. In a real UA binary codec these would be the service's
// `TypeId` node id; here they are the opaque tag our `check_answer`/decode
// pipeline dispatches on.
pub const CREATE_SESSION: u32 = 1;
pub const ACTIVATE_SESSION: u32 = 2;
pub const CLOSE_SESSION: u32 = 3;
pub const GET_ENDPOINTS: u32 = 4;
pub const FIND_SERVERS: u32 = 5;
pub const FIND_SERVERS_ON_NETWORK: u32 = 6;
pub const REGISTER_SERVER: u32 = 7;
pub const REGISTER_SERVER2: u32 = 8;
pub const BROWSE: u32 = 9;
pub const BROWSE_NEXT: u32 = 10;
pub const TRANSLATE_BROWSE_PATHS: u32 = 11;
pub const READ: u32 = 12;
pub const WRITE: u32 = 13;
pub const CALL: u32 = 14;
pub const HISTORY_READ: u32 = 15;
pub const ADD_NODES: u32 = 16;
pub const ADD_REFERENCES: u32 = 17;
pub const DELETE_REFERENCES: u32 = 18;
pub const DELETE_NODES: u32 = 19;
pub const CREATE_MONITORED_ITEMS: u32 = 20;
pub const MODIFY_MONITORED_ITEMS: u32 = 21;
pub const DELETE_MONITORED_ITEMS: u32 = 22;
pub const CREATE_SUBSCRIPTION: u32 = 23;
pub const DELETE_SUBSCRIPTIONS: u32 = 24;
pub const PUBLISH: u32 = 25;

/// NodeClass enumeration `Read` coerces an integer attribute value into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum NodeClass {
    Unspecified = 0,
    Object = 1,
    Variable = 2,
    Method = 4,
    ObjectType = 8,
    VariableType = 16,
    ReferenceType = 32,
    DataType = 64,
    View = 128,
}

impl NodeClass {
    fn from_i32(v: i32) -> Option<Self> {
        Some(match v {
            0 => NodeClass::Unspecified,
            1 => NodeClass::Object,
            2 => NodeClass::Variable,
            4 => NodeClass::Method,
            8 => NodeClass::ObjectType,
            16 => NodeClass::VariableType,
            32 => NodeClass::ReferenceType,
            64 => NodeClass::DataType,
            128 => NodeClass::View,
            _ => return None,
        })
    }
}

/// The handful of `AttributeId`s this façade needs to recognize for the
/// `Read` post-processing rule; any other attribute id reads back as a
/// plain `Variant::Int32`/`Variant::Empty`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeId {
    NodeClass,
    ValueRank,
    Other(u32),
}

impl AttributeId {
    fn as_u32(self) -> u32 {
        match self {
            AttributeId::NodeClass => 2,
            AttributeId::ValueRank => 12,
            AttributeId::Other(v) => v,
        }
    }

    fn from_u32(v: u32) -> Self {
        match v {
            2 => AttributeId::NodeClass,
            12 => AttributeId::ValueRank,
            other => AttributeId::Other(other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReadValueId {
    pub node_id: Vec<u8>,
    pub attribute_id: AttributeId,
}

impl BinaryEncodable for ReadValueId {
    fn encode(&self, enc: &mut Encoder) {
        enc.write_i32(self.node_id.len() as i32);
        enc.write_bytes(&self.node_id);
        enc.write_u32(self.attribute_id.as_u32());
    }
}

impl BinaryDecodable for ReadValueId {
    fn decode(dec: &mut Decoder) -> Result<Self, CodecError> {
        let len = dec.read_i32()?;
        let node_id = if len < 0 {
            Vec::new()
        } else {
            dec.read_bytes(len as usize)?.to_vec()
        };
        let attribute_id = AttributeId::from_u32(dec.read_u32()?);
        Ok(ReadValueId { node_id, attribute_id })
    }
}

/// A minimal stand-in for the UA `Variant` union: only the shapes the
/// `Read` post-processing rule needs to distinguish.
#[derive(Debug, Clone, PartialEq)]
pub enum Variant {
    Empty,
    Int32(i32),
    NodeClass(NodeClass),
    ValueRank(i32),
}

impl BinaryEncodable for Variant {
    fn encode(&self, enc: &mut Encoder) {
        match self {
            Variant::Empty => enc.write_u8(0),
            Variant::Int32(v) => {
                enc.write_u8(1);
                enc.write_i32(*v);
            }
            Variant::NodeClass(nc) => {
                enc.write_u8(2);
                enc.write_i32(*nc as i32);
            }
            Variant::ValueRank(v) => {
                enc.write_u8(3);
                enc.write_i32(*v);
            }
        }
    }
}

impl BinaryDecodable for Variant {
    fn decode(dec: &mut Decoder) -> Result<Self, CodecError> {
        Ok(match dec.read_u8()? {
            0 => Variant::Empty,
            1 => Variant::Int32(dec.read_i32()?),
            2 => {
                let raw = dec.read_i32()?;
                Variant::NodeClass(NodeClass::from_i32(raw).ok_or(CodecError::InvalidEncoding)?)
            }
            3 => Variant::ValueRank(dec.read_i32()?),
            _ => return Err(CodecError::InvalidEncoding),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataValue {
    pub value: Variant,
}

impl BinaryEncodable for DataValue {
    fn encode(&self, enc: &mut Encoder) {
        self.value.encode(enc);
    }
}

impl BinaryDecodable for DataValue {
    fn decode(dec: &mut Decoder) -> Result<Self, CodecError> {
        Ok(DataValue {
            value: Variant::decode(dec)?,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReadRequestParams {
    pub nodes_to_read: Vec<ReadValueId>,
}

impl BinaryEncodable for ReadRequestParams {
    fn encode(&self, enc: &mut Encoder) {
        enc.write_i32(self.nodes_to_read.len() as i32);
        for item in &self.nodes_to_read {
            item.encode(enc);
        }
    }
}

pub struct ReadResponse {
    pub header: ResponseHeader,
    pub results: Vec<DataValue>,
}

impl BinaryDecodable for ReadResponse {
    fn decode(dec: &mut Decoder) -> Result<Self, CodecError> {
        let header = ResponseHeader::decode(dec)?;
        let count = dec.read_i32()?;
        let mut results = Vec::with_capacity(count.max(0) as usize);
        for _ in 0..count.max(0) {
            results.push(DataValue::decode(dec)?);
        }
        Ok(ReadResponse { header, results })
    }
}

#[derive(Debug, Clone, Default)]
pub struct CreateSessionParams {
    pub client_description: Vec<u8>,
    pub session_timeout_ms: f64,
}

impl BinaryEncodable for CreateSessionParams {
    fn encode(&self, enc: &mut Encoder) {
        enc.write_i32(self.client_description.len() as i32);
        enc.write_bytes(&self.client_description);
        enc.write_u32(self.session_timeout_ms as u32);
    }
}

pub struct CreateSessionResponse {
    pub header: ResponseHeader,
    pub session_id: Vec<u8>,
    pub authentication_token: Vec<u8>,
    pub revised_session_timeout_ms: f64,
}

impl BinaryDecodable for CreateSessionResponse {
    fn decode(dec: &mut Decoder) -> Result<Self, CodecError> {
        let header = ResponseHeader::decode(dec)?;
        let session_id_len = dec.read_i32()?;
        let session_id = dec.read_bytes(session_id_len.max(0) as usize)?.to_vec();
        let token_len = dec.read_i32()?;
        let authentication_token = dec.read_bytes(token_len.max(0) as usize)?.to_vec();
        let revised_session_timeout_ms = dec.read_u32()? as f64;
        Ok(CreateSessionResponse {
            header,
            session_id,
            authentication_token,
            revised_session_timeout_ms,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct ActivateSessionParams {
    pub locale_ids: Vec<String>,
}

impl BinaryEncodable for ActivateSessionParams {
    fn encode(&self, enc: &mut Encoder) {
        enc.write_i32(self.locale_ids.len() as i32);
        for l in &self.locale_ids {
            enc.write_string(l);
        }
    }
}

pub struct ActivateSessionResponse {
    pub header: ResponseHeader,
}

impl BinaryDecodable for ActivateSessionResponse {
    fn decode(dec: &mut Decoder) -> Result<Self, CodecError> {
        Ok(ActivateSessionResponse {
            header: ResponseHeader::decode(dec)?,
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CloseSessionParams {
    pub delete_subscriptions: bool,
}

impl BinaryEncodable for CloseSessionParams {
    fn encode(&self, enc: &mut Encoder) {
        enc.write_u8(self.delete_subscriptions as u8);
    }
}

pub struct CloseSessionResponse {
    pub header: ResponseHeader,
}

impl BinaryDecodable for CloseSessionResponse {
    fn decode(dec: &mut Decoder) -> Result<Self, CodecError> {
        Ok(CloseSessionResponse {
            header: ResponseHeader::decode(dec)?,
        })
    }
}

impl Session {
    /// `CreateSession` stores the returned `authentication_token` into the
    /// channel so every subsequent request header carries it.
    pub async fn create_session(&self, params: CreateSessionParams) -> Result<CreateSessionResponse, StatusCode> {
        let response: CreateSessionResponse = self
            .call_service_default(CREATE_SESSION, params)
            .await?;
        process_service_result(&response.header)?;
        self.channel().set_auth_token(response.authentication_token.clone());
        Ok(response)
    }

    pub async fn activate_session(
        &self,
        params: ActivateSessionParams,
    ) -> Result<ActivateSessionResponse, StatusCode> {
        let response: ActivateSessionResponse = self.call_service_default(ACTIVATE_SESSION, params).await?;
        process_service_result(&response.header)?;
        Ok(response)
    }

    /// Tolerates `BadSessionClosed` (occurs when `Publish` requests are
    /// still in flight at close time) and treats it as success.
    pub async fn close_session(&self, params: CloseSessionParams) -> Result<(), StatusCode> {
        match self
            .call_service_default::<_, CloseSessionResponse>(CLOSE_SESSION, params)
            .await
        {
            Ok(response) => match process_service_result(&response.header) {
                Ok(()) => Ok(()),
                Err(StatusCode::BadSessionClosed) => Ok(()),
                Err(e) => Err(e),
            },
            Err(StatusCode::BadSessionClosed) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// `Read` post-processes results: a `NodeClass` attribute's integer is
    /// coerced into the enum; a `ValueRank` attribute's integer is coerced
    /// when it lies in `{-3,-2,-1,0,1,2,3,4}`, left untouched otherwise.
    pub async fn read(&self, params: ReadRequestParams) -> Result<Vec<DataValue>, StatusCode> {
        let attribute_ids: Vec<AttributeId> =
            params.nodes_to_read.iter().map(|n| n.attribute_id).collect();
        let response: ReadResponse = self.call_service_default(READ, params).await?;
        process_service_result(&response.header)?;
        let coerced = response
            .results
            .into_iter()
            .zip(attribute_ids)
            .map(|(mut data_value, attribute_id)| {
                if let Variant::Int32(raw) = data_value.value {
                    match attribute_id {
                        AttributeId::NodeClass => {
                            if let Some(nc) = NodeClass::from_i32(raw) {
                                data_value.value = Variant::NodeClass(nc);
                            }
                        }
                        AttributeId::ValueRank => {
                            if (-3..=4).contains(&raw) {
                                data_value.value = Variant::ValueRank(raw);
                            }
                        }
                        AttributeId::Other(_) => {}
                    }
                }
                data_value
            })
            .collect();
        Ok(coerced)
    }
}

/// Header-only response, for services whose result carries nothing the
/// façade itself inspects beyond `ServiceResult`.
pub struct AckResponse {
    pub header: ResponseHeader,
}

impl BinaryDecodable for AckResponse {
    fn decode(dec: &mut Decoder) -> Result<Self, CodecError> {
        Ok(AckResponse {
            header: ResponseHeader::decode(dec)?,
        })
    }
}

/// Per-item registration outcome from `RegisterServer2`, returned to the
/// caller unexamined: the façade does not special-case individual entries,
/// only the overall `ServiceResult` (see the recorded Open Question
/// decision for `RegisterServer2`).
pub struct RegisterServer2Response {
    pub header: ResponseHeader,
    pub configuration_results: Vec<StatusCode>,
}

impl BinaryDecodable for RegisterServer2Response {
    fn decode(dec: &mut Decoder) -> Result<Self, CodecError> {
        let header = ResponseHeader::decode(dec)?;
        let count = dec.read_i32()?;
        let mut configuration_results = Vec::with_capacity(count.max(0) as usize);
        for _ in 0..count.max(0) {
            configuration_results.push(status_from_raw(dec.read_u32()?));
        }
        Ok(RegisterServer2Response {
            header,
            configuration_results,
        })
    }
}

/// The remaining named services from §4.6: each runs the same five-step
/// recipe as [`Session::call_service_default`] already does, so these are
/// named entry points rather than bespoke logic. `params`/the decoded
/// result stay generic over the caller-supplied external type dictionary,
/// except where the façade itself needs to see part of the response
/// (`RegisterServer`'s `()` result, `RegisterServer2`'s per-item array).
impl Session {
    pub async fn get_endpoints<P, R>(&self, params: P) -> Result<R, StatusCode>
    where
        P: BinaryEncodable + Send,
        R: BinaryDecodable + Send,
    {
        self.call_service_default(GET_ENDPOINTS, params).await
    }

    pub async fn find_servers<P, R>(&self, params: P) -> Result<R, StatusCode>
    where
        P: BinaryEncodable + Send,
        R: BinaryDecodable + Send,
    {
        self.call_service_default(FIND_SERVERS, params).await
    }

    pub async fn find_servers_on_network<P, R>(&self, params: P) -> Result<R, StatusCode>
    where
        P: BinaryEncodable + Send,
        R: BinaryDecodable + Send,
    {
        self.call_service_default(FIND_SERVERS_ON_NETWORK, params).await
    }

    /// `RegisterServer` carries no result fields beyond `ServiceResult`.
    pub async fn register_server<P>(&self, params: P) -> Result<(), StatusCode>
    where
        P: BinaryEncodable + Send,
    {
        let response: AckResponse = self.call_service_default(REGISTER_SERVER, params).await?;
        process_service_result(&response.header)
    }

    /// Returns the server's per-entry `ConfigurationResults` unexamined.
    pub async fn register_server2<P>(&self, params: P) -> Result<Vec<StatusCode>, StatusCode>
    where
        P: BinaryEncodable + Send,
    {
        let response: RegisterServer2Response = self.call_service_default(REGISTER_SERVER2, params).await?;
        process_service_result(&response.header)?;
        Ok(response.configuration_results)
    }

    pub async fn browse<P, R>(&self, params: P) -> Result<R, StatusCode>
    where
        P: BinaryEncodable + Send,
        R: BinaryDecodable + Send,
    {
        self.call_service_default(BROWSE, params).await
    }

    pub async fn browse_next<P, R>(&self, params: P) -> Result<R, StatusCode>
    where
        P: BinaryEncodable + Send,
        R: BinaryDecodable + Send,
    {
        self.call_service_default(BROWSE_NEXT, params).await
    }

    pub async fn translate_browse_paths_to_node_ids<P, R>(&self, params: P) -> Result<R, StatusCode>
    where
        P: BinaryEncodable + Send,
        R: BinaryDecodable + Send,
    {
        self.call_service_default(TRANSLATE_BROWSE_PATHS, params).await
    }

    pub async fn write<P, R>(&self, params: P) -> Result<R, StatusCode>
    where
        P: BinaryEncodable + Send,
        R: BinaryDecodable + Send,
    {
        self.call_service_default(WRITE, params).await
    }

    pub async fn call<P, R>(&self, params: P) -> Result<R, StatusCode>
    where
        P: BinaryEncodable + Send,
        R: BinaryDecodable + Send,
    {
        self.call_service_default(CALL, params).await
    }

    pub async fn history_read<P, R>(&self, params: P) -> Result<R, StatusCode>
    where
        P: BinaryEncodable + Send,
        R: BinaryDecodable + Send,
    {
        self.call_service_default(HISTORY_READ, params).await
    }

    pub async fn add_nodes<P, R>(&self, params: P) -> Result<R, StatusCode>
    where
        P: BinaryEncodable + Send,
        R: BinaryDecodable + Send,
    {
        self.call_service_default(ADD_NODES, params).await
    }

    pub async fn add_references<P, R>(&self, params: P) -> Result<R, StatusCode>
    where
        P: BinaryEncodable + Send,
        R: BinaryDecodable + Send,
    {
        self.call_service_default(ADD_REFERENCES, params).await
    }

    pub async fn delete_references<P, R>(&self, params: P) -> Result<R, StatusCode>
    where
        P: BinaryEncodable + Send,
        R: BinaryDecodable + Send,
    {
        self.call_service_default(DELETE_REFERENCES, params).await
    }

    pub async fn delete_nodes<P, R>(&self, params: P) -> Result<R, StatusCode>
    where
        P: BinaryEncodable + Send,
        R: BinaryDecodable + Send,
    {
        self.call_service_default(DELETE_NODES, params).await
    }

    pub async fn create_monitored_items<P, R>(&self, params: P) -> Result<R, StatusCode>
    where
        P: BinaryEncodable + Send,
        R: BinaryDecodable + Send,
    {
        self.call_service_default(CREATE_MONITORED_ITEMS, params).await
    }

    pub async fn modify_monitored_items<P, R>(&self, params: P) -> Result<R, StatusCode>
    where
        P: BinaryEncodable + Send,
        R: BinaryDecodable + Send,
    {
        self.call_service_default(MODIFY_MONITORED_ITEMS, params).await
    }

    pub async fn delete_monitored_items<P, R>(&self, params: P) -> Result<R, StatusCode>
    where
        P: BinaryEncodable + Send,
        R: BinaryDecodable + Send,
    {
        self.call_service_default(DELETE_MONITORED_ITEMS, params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_value_id_round_trips() {
        let item = ReadValueId {
            node_id: vec![1, 2, 3],
            attribute_id: AttributeId::NodeClass,
        };
        let bytes = item.encode_to_vec();
        let mut dec = Decoder::new(&bytes);
        let back = ReadValueId::decode(&mut dec).unwrap();
        assert_eq!(back.node_id, vec![1, 2, 3]);
        assert_eq!(back.attribute_id, AttributeId::NodeClass);
    }

    #[test]
    fn node_class_and_value_rank_roundtrip_through_variant() {
        let nc = Variant::NodeClass(NodeClass::Variable);
        let bytes = nc.encode_to_vec();
        let mut dec = Decoder::new(&bytes);
        assert_eq!(Variant::decode(&mut dec).unwrap(), nc);

        let vr = Variant::ValueRank(-1);
        let bytes = vr.encode_to_vec();
        let mut dec = Decoder::new(&bytes);
        assert_eq!(Variant::decode(&mut dec).unwrap(), vr);
    }

    #[test]
    fn register_server2_response_decodes_per_item_results_unexamined() {
        let header = ResponseHeader {
            timestamp: chrono::Utc::now(),
            request_handle: 1,
            service_result: StatusCode::Good,
        };
        let mut enc = Encoder::new();
        header.encode(&mut enc);
        enc.write_i32(2);
        enc.write_u32(StatusCode::Good as u32);
        enc.write_u32(StatusCode::BadSessionClosed as u32);
        let bytes = enc.into_vec();

        let mut dec = Decoder::new(&bytes);
        let response = RegisterServer2Response::decode(&mut dec).unwrap();
        assert_eq!(
            response.configuration_results,
            vec![StatusCode::Good, StatusCode::BadSessionClosed]
        );
    }
}
