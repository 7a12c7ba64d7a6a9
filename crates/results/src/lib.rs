//! xcauto Result Analysis
//!
//! Turns the opaque dumps Xcode leaves behind into a navigable model:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  ResultBundle (.xcresult)                                    │
//! │    ├── XcResultTool   - xcrun xcresulttool invocations       │
//! │    ├── TestTree       - arena of suites / cases, index lookup│
//! │    ├── attachments    - canonical TestAttachment records     │
//! │    └── console        - per-test console slices              │
//! ├──────────────────────────────────────────────────────────────┤
//! │  AttachmentResolver                                          │
//! │    ├── screenshot(node, t) - closest image or video frame    │
//! │    └── ui_hierarchy(node, t) -> UiHierarchy                  │
//! ├──────────────────────────────────────────────────────────────┤
//! │  UiHierarchy - indented dump -> flat arena + slim projection │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod attachments;
pub mod bundle;
pub mod hierarchy;
pub mod tool;
pub mod tree;

pub use attachments::{
    select_closest, AttachmentKind, AttachmentResolver, FallbackPolicy, FrameExtractor,
    HierarchySnapshot, ScreenshotResult, ScreenshotSource, Selection, TestAttachment,
};
pub use bundle::{bundle_ready, wait_until_ready, FailedTest, ResultBundle, TestRunReport};
pub use hierarchy::{SlimUiNode, UiElementNode, UiHierarchy};
pub use tool::{TestSummary, XcResultTool};
pub use tree::{TestNode, TestNodeType, TestStatus, TestTree};
