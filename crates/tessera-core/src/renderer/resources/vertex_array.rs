// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use super::{bind_context, upgrade_context, BoundContext, EpochHandle};
use crate::renderer::api::{
    BufferTarget, BufferUsage, ContextId, IndexFormat, MeshData, NativeHandle, PrimitiveTopology,
    VertexAttributeSemantic, VertexStream, MAX_UV_CHANNELS,
};
use crate::renderer::context::{ContextListener, ListenerId, RenderingContext};
use crate::renderer::error::{ContextError, DriverError, ResourceError};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

/// Re-uploads a vertex array's content after its native objects were
/// recreated. The flag is `true` when forced by a context recreation.
pub type MeshReloadCallback = Arc<dyn Fn(&VertexArray, bool) + Send + Sync>;

#[derive(Debug, Default)]
struct VertexArrayInner {
    vertex_array: Option<EpochHandle>,
    index_buffer: Option<EpochHandle>,
    vertex_buffers: BTreeMap<VertexAttributeSemantic, EpochHandle>,
    mesh: MeshData,
}

impl VertexArrayInner {
    fn clear_handles(&mut self) {
        self.vertex_array = None;
        self.index_buffer = None;
        self.vertex_buffers.clear();
    }
}

/// A native vertex array with one index buffer and one vertex buffer per
/// attribute semantic.
///
/// Everything uploaded is mirrored in a CPU [`MeshData`], which restores the
/// GPU copy after a context recreation unless a reload callback is set.
pub struct VertexArray {
    context: Weak<RenderingContext>,
    context_id: ContextId,
    inner: Mutex<VertexArrayInner>,
    reload: Mutex<Option<MeshReloadCallback>>,
    listener: Mutex<Option<ListenerId>>,
}

impl std::fmt::Debug for VertexArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("VertexArray")
            .field("context", &self.context_id)
            .field("vertex_array", &inner.vertex_array)
            .field("index_count", &inner.mesh.indices.len())
            .field("streams", &inner.mesh.streams.len())
            .finish()
    }
}

fn validate_stream(stream: &VertexStream) -> Result<(), ResourceError> {
    if !(1..=4).contains(&stream.components) {
        return Err(ResourceError::BackendError(format!(
            "{:?} stream has {} components",
            stream.semantic, stream.components
        )));
    }
    if stream.data.len() % stream.components as usize != 0 {
        return Err(ResourceError::OutOfBounds);
    }
    if let VertexAttributeSemantic::Uv(channel) = stream.semantic {
        if channel as usize >= MAX_UV_CHANNELS {
            return Err(ResourceError::OutOfBounds);
        }
    }
    Ok(())
}

impl VertexArray {
    /// Creates an empty vertex array in `context`.
    pub fn new(context: &Arc<RenderingContext>) -> Result<Arc<Self>, ResourceError> {
        if !context.is_valid() {
            return Err(ResourceError::Context(ContextError::InvalidContext));
        }
        let vertex_array = Arc::new(Self {
            context: Arc::downgrade(context),
            context_id: context.id(),
            inner: Mutex::new(VertexArrayInner::default()),
            reload: Mutex::new(None),
            listener: Mutex::new(None),
        });
        {
            let bound = bind_context(context)?;
            let mut inner = vertex_array.inner.lock();
            Self::ensure_vertex_array(&bound, &mut inner)?;
        }
        let weak: Weak<dyn ContextListener> = Arc::downgrade(&vertex_array) as Weak<dyn ContextListener>;
        *vertex_array.listener.lock() = Some(context.subscribe(weak));
        Ok(vertex_array)
    }

    /// Id of the owning context.
    pub fn context_id(&self) -> ContextId {
        self.context_id
    }

    /// The vertex array handle, if it belongs to the current context epoch.
    pub fn handle(&self) -> Option<NativeHandle> {
        let context = self.context.upgrade()?;
        self.inner.lock().vertex_array.and_then(|h| h.get(&context))
    }

    /// The index buffer handle, if any was uploaded in the current epoch.
    pub fn index_buffer(&self) -> Option<NativeHandle> {
        let context = self.context.upgrade()?;
        self.inner.lock().index_buffer.and_then(|h| h.get(&context))
    }

    /// The buffer holding the `semantic` stream in the current epoch.
    pub fn vertex_buffer(&self, semantic: VertexAttributeSemantic) -> Option<NativeHandle> {
        let context = self.context.upgrade()?;
        self.inner
            .lock()
            .vertex_buffers
            .get(&semantic)
            .and_then(|h| h.get(&context))
    }

    /// Number of indices drawn by [`draw`](crate::renderer::queue::RenderQueue::draw).
    pub fn index_count(&self) -> u32 {
        self.inner.lock().mesh.indices.len() as u32
    }

    /// Format of the GPU index buffer.
    pub fn index_format(&self) -> IndexFormat {
        self.inner.lock().mesh.index_format
    }

    /// Primitive topology.
    pub fn topology(&self) -> PrimitiveTopology {
        self.inner.lock().mesh.topology
    }

    /// A copy of the retained CPU mesh.
    pub fn mesh(&self) -> MeshData {
        self.inner.lock().mesh.clone()
    }

    /// Registers the callback used to restore content after recreation.
    pub fn set_reload_callback(&self, callback: Option<MeshReloadCallback>) {
        *self.reload.lock() = callback;
    }

    /// Replaces the whole mesh.
    pub fn set_mesh(&self, mesh: MeshData) -> Result<(), ResourceError> {
        for stream in &mesh.streams {
            validate_stream(stream)?;
        }
        let counts: Vec<usize> = mesh.streams.iter().map(VertexStream::vertex_count).collect();
        if counts.windows(2).any(|w| w[0] != w[1]) {
            return Err(ResourceError::BackendError(
                "vertex streams disagree on the vertex count".to_string(),
            ));
        }

        let context = upgrade_context(&self.context)?;
        let bound = bind_context(&context)?;
        let mut inner = self.inner.lock();
        Self::upload_indices(&bound, &mut inner, &mesh)?;
        for stream in &mesh.streams {
            Self::upload_stream(&bound, &mut inner, stream)?;
        }
        inner.mesh = mesh;
        Ok(())
    }

    /// Replaces the index buffer. The narrowest fitting index format is used.
    pub fn set_indices(&self, indices: Vec<u32>) -> Result<(), ResourceError> {
        let context = upgrade_context(&self.context)?;
        let bound = bind_context(&context)?;
        let mut inner = self.inner.lock();
        let topology = inner.mesh.topology;
        let streams = std::mem::take(&mut inner.mesh.streams);
        let mesh = MeshData {
            topology,
            streams,
            ..Default::default()
        }
        .with_indices(indices);
        let result = Self::upload_indices(&bound, &mut inner, &mesh);
        inner.mesh = mesh;
        result
    }

    /// Adds or replaces one attribute stream.
    pub fn set_vertices(&self, stream: VertexStream) -> Result<(), ResourceError> {
        validate_stream(&stream)?;
        let context = upgrade_context(&self.context)?;
        let bound = bind_context(&context)?;
        let mut inner = self.inner.lock();
        Self::upload_stream(&bound, &mut inner, &stream)?;
        inner.mesh.set_stream(stream);
        Ok(())
    }

    /// Binds the vertex array through the state cache.
    pub fn bind(&self) -> Result<NativeHandle, ResourceError> {
        let context = upgrade_context(&self.context)?;
        let bound = bind_context(&context)?;
        let handle = self
            .inner
            .lock()
            .vertex_array
            .and_then(|h| h.get(bound.context))
            .ok_or(ResourceError::InvalidHandle)?;
        bound.context.state().bind_vertex_array(Some(handle));
        Ok(handle)
    }

    fn ensure_vertex_array(bound: &BoundContext<'_>, inner: &mut VertexArrayInner) -> Result<NativeHandle, ResourceError> {
        if let Some(handle) = inner.vertex_array.and_then(|h| h.get(bound.context)) {
            return Ok(handle);
        }
        let handle = bound
            .context
            .driver()
            .create_vertex_array()
            .ok_or(DriverError::ObjectCreationFailed("vertex array"))?;
        inner.vertex_array = Some(EpochHandle::new(handle, bound.context));
        Ok(handle)
    }

    fn ensure_buffer(bound: &BoundContext<'_>, slot: &mut Option<EpochHandle>) -> Result<NativeHandle, ResourceError> {
        if let Some(handle) = slot.and_then(|h| h.get(bound.context)) {
            return Ok(handle);
        }
        let handle = bound
            .context
            .driver()
            .create_buffer()
            .ok_or(DriverError::ObjectCreationFailed("buffer"))?;
        *slot = Some(EpochHandle::new(handle, bound.context));
        Ok(handle)
    }

    fn upload_indices(bound: &BoundContext<'_>, inner: &mut VertexArrayInner, mesh: &MeshData) -> Result<(), ResourceError> {
        let vertex_array = Self::ensure_vertex_array(bound, inner)?;
        let buffer = Self::ensure_buffer(bound, &mut inner.index_buffer)?;
        let bytes = mesh.index_bytes();
        let mut state = bound.context.state();
        state.bind_vertex_array(Some(vertex_array));
        state.bind_buffer(BufferTarget::ElementArray, Some(buffer));
        bound
            .context
            .driver()
            .buffer_data(BufferTarget::ElementArray, bytes.len(), Some(&bytes), BufferUsage::StaticDraw);
        Ok(())
    }

    fn upload_stream(bound: &BoundContext<'_>, inner: &mut VertexArrayInner, stream: &VertexStream) -> Result<(), ResourceError> {
        let vertex_array = Self::ensure_vertex_array(bound, inner)?;
        let mut slot = inner.vertex_buffers.get(&stream.semantic).copied();
        let buffer = Self::ensure_buffer(bound, &mut slot)?;
        if let Some(handle) = slot {
            inner.vertex_buffers.insert(stream.semantic, handle);
        }

        let bytes: &[u8] = bytemuck::cast_slice(&stream.data);
        let location = stream.semantic.location();
        let driver = bound.context.driver();
        let mut state = bound.context.state();
        state.bind_vertex_array(Some(vertex_array));
        state.bind_buffer(BufferTarget::Array, Some(buffer));
        driver.buffer_data(BufferTarget::Array, bytes.len(), Some(bytes), BufferUsage::StaticDraw);
        driver.vertex_attrib_pointer(location, stream.components, stream.components as u32 * 4, 0);
        driver.enable_vertex_attrib_array(location);
        Ok(())
    }

    fn restore(&self, context: &RenderingContext) -> Result<(), ResourceError> {
        {
            let bound = bind_context(context)?;
            let mut inner = self.inner.lock();
            Self::ensure_vertex_array(&bound, &mut inner)?;
        }
        let callback = self.reload.lock().clone();
        if let Some(callback) = callback {
            callback(self, true);
            return Ok(());
        }
        let bound = bind_context(context)?;
        let mut inner = self.inner.lock();
        let mesh = inner.mesh.clone();
        if !mesh.indices.is_empty() {
            Self::upload_indices(&bound, &mut inner, &mesh)?;
        }
        for stream in &mesh.streams {
            Self::upload_stream(&bound, &mut inner, stream)?;
        }
        Ok(())
    }
}

impl ContextListener for VertexArray {
    fn on_context_setup_complete(&self, context: &RenderingContext) {
        if self.inner.lock().vertex_array.and_then(|h| h.get(context)).is_some() {
            return;
        }
        if let Err(e) = self.restore(context) {
            log::error!("VertexArray in {}: restore failed: {e}", self.context_id);
        }
    }

    fn on_context_will_be_destroyed(&self, _context: &RenderingContext) {
        self.inner.lock().clear_handles();
    }

    fn on_context_destroyed(&self, context: &RenderingContext) {
        let mut inner = self.inner.lock();
        inner.clear_handles();
        if context.is_destroyed() {
            inner.mesh = MeshData::default();
        }
    }
}

impl Drop for VertexArray {
    fn drop(&mut self) {
        let Some(context) = self.context.upgrade() else {
            return;
        };
        if let Some(id) = self.listener.get_mut().take() {
            context.unsubscribe(id);
        }
        let inner = self.inner.get_mut();
        let vertex_array = inner.vertex_array.and_then(|h| h.get(&context));
        let buffers: Vec<NativeHandle> = inner
            .index_buffer
            .iter()
            .chain(inner.vertex_buffers.values())
            .filter_map(|h| h.get(&context))
            .collect();
        if vertex_array.is_none() && buffers.is_empty() {
            return;
        }
        let Ok(bound) = bind_context(&context) else {
            log::warn!("VertexArray in {}: leaking native objects.", self.context_id);
            return;
        };
        let driver = bound.context.driver();
        let mut state = bound.context.state();
        if let Some(handle) = vertex_array {
            state.forget_vertex_array(handle);
            driver.delete_vertex_array(handle);
        }
        for buffer in buffers {
            state.forget_buffer(buffer);
            driver.delete_buffer(buffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::context::ContextConfig;
    use crate::renderer::headless::HeadlessDriver;
    use crate::renderer::RenderSystem;

    fn triangle() -> MeshData {
        MeshData::new()
            .with_indices(vec![0, 1, 2])
            .with_stream(
                VertexAttributeSemantic::Position,
                3,
                vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
            )
            .with_stream(VertexAttributeSemantic::Uv(0), 2, vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0])
    }

    fn setup() -> (Arc<HeadlessDriver>, RenderSystem, Arc<RenderingContext>) {
        let driver = Arc::new(HeadlessDriver::new());
        let system = RenderSystem::new(driver.clone(), Default::default());
        let context = system.create_context(None, ContextConfig::labeled("c1")).unwrap();
        (driver, system, context)
    }

    #[test]
    fn test_set_mesh_uploads_every_stream() {
        let (driver, _system, context) = setup();
        let vertex_array = VertexArray::new(&context).unwrap();
        vertex_array.set_mesh(triangle()).unwrap();

        let _bind = context.scoped_bind(false).unwrap();
        let handle = vertex_array.handle().unwrap();
        assert_eq!(driver.enabled_attributes(handle), vec![0, 5]);
        let indices = driver.buffer_contents(vertex_array.index_buffer().unwrap()).unwrap();
        assert_eq!(indices.len(), 6);
        assert_eq!(vertex_array.index_count(), 3);
        assert_eq!(vertex_array.index_format(), IndexFormat::Uint16);
    }

    #[test]
    fn test_rejects_mismatched_streams() {
        let (_driver, _system, context) = setup();
        let vertex_array = VertexArray::new(&context).unwrap();
        let mesh = triangle().with_stream(VertexAttributeSemantic::Normal, 3, vec![0.0; 6]);
        assert!(vertex_array.set_mesh(mesh).is_err());
        let bad_uv = MeshData::new().with_stream(VertexAttributeSemantic::Uv(4), 2, vec![0.0; 6]);
        assert_eq!(vertex_array.set_mesh(bad_uv), Err(ResourceError::OutOfBounds));
    }

    #[test]
    fn test_cpu_copy_restores_after_recreation() {
        let (driver, _system, context) = setup();
        let vertex_array = VertexArray::new(&context).unwrap();
        vertex_array.set_mesh(triangle()).unwrap();
        vertex_array
            .set_vertices(VertexStream {
                semantic: VertexAttributeSemantic::Color,
                components: 4,
                data: vec![1.0; 12],
            })
            .unwrap();

        context.recreate().unwrap();

        let _bind = context.scoped_bind(false).unwrap();
        let handle = vertex_array.handle().unwrap();
        assert_eq!(driver.enabled_attributes(handle), vec![0, 4, 5]);
        let colors = driver
            .buffer_contents(vertex_array.vertex_buffer(VertexAttributeSemantic::Color).unwrap())
            .unwrap();
        assert_eq!(colors.len(), 12 * 4);
    }

    #[test]
    fn test_reload_callback_replaces_cpu_copy() {
        let (driver, _system, context) = setup();
        let vertex_array = VertexArray::new(&context).unwrap();
        vertex_array.set_mesh(triangle()).unwrap();
        vertex_array.set_reload_callback(Some(Arc::new(|vertex_array: &VertexArray, force: bool| {
            assert!(force);
            vertex_array.set_indices(vec![0, 1, 2, 2, 1, 0]).unwrap();
        })));

        context.recreate().unwrap();

        let _bind = context.scoped_bind(false).unwrap();
        assert_eq!(vertex_array.index_count(), 6);
        // Only the callback's upload happened: no attribute was re-enabled.
        assert!(driver.enabled_attributes(vertex_array.handle().unwrap()).is_empty());
    }

    #[test]
    fn test_set_indices_widens_format() {
        let (_driver, _system, context) = setup();
        let vertex_array = VertexArray::new(&context).unwrap();
        vertex_array.set_indices(vec![0, 100_000, 1]).unwrap();
        assert_eq!(vertex_array.index_format(), IndexFormat::Uint32);
    }
}
