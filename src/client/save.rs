//! The save pipeline: graph → payload → transport → correlation.

use super::DataServiceContext;
use crate::config::AnnotationStyle;
use crate::error::{ODataError, Result};
use crate::graph::{GraphBuilder, SaveMode, UpdateGraph};
use crate::model::InstanceId;
use crate::response::{Materializer, PayloadKind, QueryResult, ResponseCorrelator, SaveChangesResponse, SaveResult};
use crate::serializer::uri::absolute_uri;
use crate::serializer::{JsonWriter, PayloadSerializer, PayloadShape};
use crate::transport::{AsyncTransport, HttpMethod, ODataRequest, ODataResponse, Transport};

const JSON_CONTENT_TYPE: &str = "application/json;odata.metadata=minimal";
const CONTINUE_ON_ERROR: &str = "odata.continue-on-error";

/// A fully written request and the shape of its payload.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub request: ODataRequest,
    pub shape: PayloadShape,
}

impl DataServiceContext {
    /// Build the update graph for `roots` from the pending descriptors.
    pub fn build_graph(&self, mode: SaveMode, roots: &[InstanceId], validate_only: bool) -> Result<UpdateGraph> {
        let changed = self.tracker.modified_descriptors();
        GraphBuilder::new(&self.tracker, self.model.as_ref(), mode).build_descriptor_graph(
            &changed,
            validate_only,
            roots,
        )
    }

    /// Build and serialize the request for a bulk update or deep insert.
    ///
    /// The body is written completely before this returns; a serialization
    /// error drops it.
    pub fn build_request(&self, mode: SaveMode, roots: &[InstanceId]) -> Result<PreparedRequest> {
        let graph = self.build_graph(mode, roots, false)?;
        let entity_set = graph
            .entity_set_name()
            .ok_or_else(|| ODataError::argument_null("entitySetName"))?
            .to_string();

        let serializer = PayloadSerializer::new(&self.tracker, &self.instances, self.model.as_ref(), &self.config);
        let mut writer = JsonWriter::new(Vec::new(), self.config.payload.pretty);
        let (method, shape) = match mode {
            SaveMode::BulkUpdate => (HttpMethod::Patch, serializer.write_graph(&graph, &mut writer)?),
            SaveMode::DeepInsert => {
                let root = graph
                    .top_level_descriptors()
                    .first()
                    .copied()
                    .ok_or_else(|| ODataError::argument_null("roots"))?;
                (HttpMethod::Post, serializer.write_single_entity(root, &graph, &mut writer)?)
            }
        };
        let body = writer.into_inner()?;

        let payload = &self.config.payload;
        let content_type = if payload.ieee754_compatible {
            format!("{JSON_CONTENT_TYPE};IEEE754Compatible=true")
        } else {
            JSON_CONTENT_TYPE.to_string()
        };
        let version = match payload.annotation_style {
            AnnotationStyle::Short => "4.01",
            AnnotationStyle::Prefixed => "4.0",
        };
        let mut request = ODataRequest::new(method, absolute_uri(self.config.service_root(), &entity_set))
            .header("Content-Type", content_type.clone())
            .header("Accept", content_type)
            .header("OData-Version", version);
        if self.config.save.continue_on_error {
            request = request.header("Prefer", CONTINUE_ON_ERROR);
        }
        request = request.body(body);

        tracing::info!(
            %mode,
            method = %request.method,
            uri = %request.uri,
            nodes = shape.node_count(),
            bytes = request.body.len(),
            "prepared save request"
        );
        Ok(PreparedRequest { request, shape })
    }

    /// Correlate a save response with the request it answers.
    pub fn apply_response(
        &mut self,
        shape: &PayloadShape,
        response: &ODataResponse,
        result: &mut SaveResult,
    ) -> Result<SaveChangesResponse> {
        ResponseCorrelator::new(&mut self.tracker, &mut self.instances, self.model.as_ref(), &self.config)
            .correlate(shape, response, result)
    }

    fn save<T: Transport + ?Sized>(
        &mut self,
        transport: &T,
        mode: SaveMode,
        roots: &[InstanceId],
    ) -> Result<SaveChangesResponse> {
        let PreparedRequest { request, shape } = self.build_request(mode, roots)?;
        let mut result = SaveResult::new();
        result.begin_sending();
        let response = transport.send(&request).map_err(|err| {
            tracing::warn!(error = %err, "transport failed");
            result.fail();
            ODataError::from(err)
        })?;
        self.apply_response(&shape, &response, &mut result)
    }

    async fn save_async<T: AsyncTransport + ?Sized>(
        &mut self,
        transport: &T,
        mode: SaveMode,
        roots: &[InstanceId],
    ) -> Result<SaveChangesResponse> {
        let PreparedRequest { request, shape } = self.build_request(mode, roots)?;
        let mut result = SaveResult::new();
        result.begin_sending();
        let response = match transport.send(&request).await {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(error = %err, "transport failed");
                result.fail();
                return Err(err.into());
            }
        };
        self.apply_response(&shape, &response, &mut result)
    }

    /// Send every pending change reachable from `roots` as one delta payload.
    pub fn bulk_update<T: Transport + ?Sized>(&mut self, transport: &T, roots: &[InstanceId]) -> Result<SaveChangesResponse> {
        self.save(transport, SaveMode::BulkUpdate, roots)
    }

    /// Insert `root` together with its added related entities.
    pub fn deep_insert<T: Transport + ?Sized>(&mut self, transport: &T, root: InstanceId) -> Result<SaveChangesResponse> {
        self.save(transport, SaveMode::DeepInsert, &[root])
    }

    pub async fn bulk_update_async<T: AsyncTransport + ?Sized>(
        &mut self,
        transport: &T,
        roots: &[InstanceId],
    ) -> Result<SaveChangesResponse> {
        self.save_async(transport, SaveMode::BulkUpdate, roots).await
    }

    pub async fn deep_insert_async<T: AsyncTransport + ?Sized>(
        &mut self,
        transport: &T,
        root: InstanceId,
    ) -> Result<SaveChangesResponse> {
        self.save_async(transport, SaveMode::DeepInsert, &[root]).await
    }

    /// Read a query response as `kind`.
    pub fn materialize(
        &self,
        response: &ODataResponse,
        kind: PayloadKind,
        expected_type: Option<&str>,
    ) -> Result<QueryResult> {
        Materializer::new(self.model.as_ref(), self.config.payload.annotation_style).materialize(
            response,
            kind,
            expected_type,
        )
    }

    /// `GET {root}/{path}` and materialize the response.
    pub fn execute<T: Transport + ?Sized>(
        &self,
        transport: &T,
        path: &str,
        kind: PayloadKind,
        expected_type: Option<&str>,
    ) -> Result<QueryResult> {
        let request = ODataRequest::new(HttpMethod::Get, absolute_uri(self.config.service_root(), path))
            .header("Accept", JSON_CONTENT_TYPE);
        tracing::debug!(uri = %request.uri, "executing query");
        let response = transport.send(&request)?;
        self.materialize(&response, kind, expected_type)
    }
}
