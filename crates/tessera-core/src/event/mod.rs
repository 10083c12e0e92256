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

//! Channel-based notifications for code that lives outside the render thread.
//!
//! Context lifecycle dispatch to GPU resources is synchronous and handled by
//! [`crate::renderer::context::ListenerList`]. The [`EventBus`] here is the
//! asynchronous side: the render system publishes coarse events (a context was
//! created, released, or became the default) that tools and asset code drain at
//! their own pace.

mod bus;

pub use self::bus::EventBus;
