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

//! Write cursor and staging storage shared by both stream strategies.

use super::{InstancePayload, StreamState};
use crate::renderer::error::StreamError;

/// One flushed batch: instances `[first, first + count)` of the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Batch {
    pub(crate) first: usize,
    pub(crate) count: usize,
}

/// Per-frame staging of encoded instances and the batch cursor over them.
///
/// `staging` always holds `(offset + pending) * texels_per_instance` texels.
#[derive(Debug)]
pub(crate) struct BatchCursor {
    texels_per_instance: usize,
    per_draw: usize,
    per_frame: usize,
    staging: Vec<[f32; 4]>,
    offset: usize,
    pending: usize,
    flushed: usize,
    state: StreamState,
}

impl BatchCursor {
    pub(crate) fn new(texels_per_instance: usize, per_draw: usize, per_frame: usize) -> Self {
        Self {
            texels_per_instance,
            per_draw,
            per_frame,
            staging: Vec::new(),
            offset: 0,
            pending: 0,
            flushed: 0,
            state: StreamState::Idle,
        }
    }

    pub(crate) fn state(&self) -> StreamState {
        self.state
    }

    pub(crate) fn per_draw(&self) -> usize {
        self.per_draw
    }

    pub(crate) fn per_frame(&self) -> usize {
        self.per_frame
    }

    pub(crate) fn offset(&self) -> usize {
        self.offset
    }

    pub(crate) fn pending(&self) -> usize {
        self.pending
    }

    pub(crate) fn remaining(&self) -> usize {
        let in_draw = self.per_draw.saturating_sub(self.pending);
        let in_frame = self.per_frame.saturating_sub(self.offset + self.pending);
        in_draw.min(in_frame)
    }

    /// Moves the cursor and drops any pending instances.
    pub(crate) fn set_offset(&mut self, offset: usize) {
        self.offset = offset.min(self.per_frame);
        self.pending = 0;
        self.flushed = 0;
        self.staging
            .resize(self.offset * self.texels_per_instance, [0.0; 4]);
        self.state = StreamState::Idle;
    }

    pub(crate) fn begin_frame(&mut self) {
        self.staging.clear();
        self.offset = 0;
        self.pending = 0;
        self.flushed = 0;
        self.state = StreamState::Idle;
    }

    fn reserve(&mut self, count: usize) -> Result<&mut [[f32; 4]], StreamError> {
        if self.state == StreamState::FlushedForDraw {
            self.complete_draw();
        }
        let in_draw = self.pending + count;
        if in_draw > self.per_draw {
            return Err(StreamError::CapacityExceeded {
                requested: in_draw,
                capacity: self.per_draw,
            });
        }
        let in_frame = self.offset + in_draw;
        if in_frame > self.per_frame {
            return Err(StreamError::CapacityExceeded {
                requested: in_frame,
                capacity: self.per_frame,
            });
        }
        let start = self.staging.len();
        self.staging
            .resize(start + count * self.texels_per_instance, [0.0; 4]);
        self.pending = in_draw;
        self.state = StreamState::Accumulating;
        Ok(&mut self.staging[start..])
    }

    pub(crate) fn push<P: InstancePayload>(&mut self, payload: &P) -> Result<(), StreamError> {
        let texels = self.reserve(1)?;
        payload.write_texels(texels);
        Ok(())
    }

    /// Appends every payload or none of them.
    pub(crate) fn push_slice<P: InstancePayload>(&mut self, payloads: &[P]) -> Result<(), StreamError> {
        if payloads.is_empty() {
            return Ok(());
        }
        let texels = self.reserve(payloads.len())?;
        for (payload, out) in payloads
            .iter()
            .zip(texels.chunks_exact_mut(P::TEXELS_PER_INSTANCE))
        {
            payload.write_texels(out);
        }
        Ok(())
    }

    /// Marks the first `count` pending instances as the batch to draw.
    pub(crate) fn flush(&mut self, count: usize) -> Result<Batch, StreamError> {
        if count == 0 || count > self.pending {
            return Err(StreamError::NothingToFlush {
                requested: count,
                pending: self.pending,
            });
        }
        self.flushed = count;
        self.state = StreamState::FlushedForDraw;
        Ok(Batch {
            first: self.offset,
            count,
        })
    }

    /// Encoded texels of `batch`.
    pub(crate) fn texels(&self, batch: Batch) -> &[[f32; 4]] {
        let start = batch.first * self.texels_per_instance;
        let end = (batch.first + batch.count) * self.texels_per_instance;
        &self.staging[start..end]
    }

    /// Staged texels in `range`, clipped to what has been written.
    pub(crate) fn staged(&self, range: std::ops::Range<usize>) -> &[[f32; 4]] {
        let end = range.end.min(self.staging.len());
        let start = range.start.min(end);
        &self.staging[start..end]
    }

    pub(crate) fn texels_per_instance(&self) -> usize {
        self.texels_per_instance
    }

    /// Advances past the flushed batch.
    pub(crate) fn complete_draw(&mut self) {
        if self.state != StreamState::FlushedForDraw {
            return;
        }
        self.offset += self.flushed;
        self.pending -= self.flushed;
        self.flushed = 0;
        self.state = if self.pending > 0 {
            StreamState::Accumulating
        } else {
            StreamState::Idle
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::instancing::{AffineTransform, InstanceColor};
    use crate::math::LinearRgba;

    fn red() -> InstanceColor {
        InstanceColor(LinearRgba::RED)
    }

    #[test]
    fn test_per_draw_capacity() {
        let mut cursor = BatchCursor::new(1, 3, 100);
        for _ in 0..3 {
            cursor.push(&red()).unwrap();
        }
        assert_eq!(
            cursor.push(&red()),
            Err(StreamError::CapacityExceeded {
                requested: 4,
                capacity: 3
            })
        );
        assert_eq!(cursor.pending(), 3);
    }

    #[test]
    fn test_slice_is_all_or_nothing() {
        let mut cursor = BatchCursor::new(1, 4, 100);
        cursor.push(&red()).unwrap();
        assert!(cursor.push_slice(&[red(); 4]).is_err());
        assert_eq!(cursor.pending(), 1);
        cursor.push_slice(&[red(); 3]).unwrap();
        assert_eq!(cursor.pending(), 4);
    }

    #[test]
    fn test_complete_draw_advances_offset() {
        let mut cursor = BatchCursor::new(4, 8, 100);
        cursor.push_slice(&[AffineTransform::IDENTITY; 5]).unwrap();
        let batch = cursor.flush(3).unwrap();
        assert_eq!(batch, Batch { first: 0, count: 3 });
        assert_eq!(cursor.texels(batch).len(), 12);
        cursor.complete_draw();
        assert_eq!(cursor.offset(), 3);
        assert_eq!(cursor.pending(), 2);
        assert_eq!(cursor.state(), StreamState::Accumulating);
    }

    #[test]
    fn test_frame_capacity_spans_draws() {
        let mut cursor = BatchCursor::new(1, 2, 3);
        cursor.push_slice(&[red(); 2]).unwrap();
        cursor.flush(2).unwrap();
        cursor.push(&red()).unwrap();
        assert_eq!(
            cursor.push(&red()),
            Err(StreamError::CapacityExceeded {
                requested: 4,
                capacity: 3
            })
        );
        cursor.begin_frame();
        assert_eq!(cursor.offset(), 0);
        assert_eq!(cursor.remaining(), 2);
    }

    #[test]
    fn test_flush_more_than_pending() {
        let mut cursor = BatchCursor::new(1, 2, 2);
        assert_eq!(
            cursor.flush(1),
            Err(StreamError::NothingToFlush {
                requested: 1,
                pending: 0
            })
        );
    }
}
