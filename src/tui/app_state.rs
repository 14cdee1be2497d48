use crate::tree::NodeId;

/// One rendered line of the browser: a node of one workspace directory at
/// its indent depth. Rows are a projection rebuilt from the trees whenever
/// visibility changes; selection state is read live at draw time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct Row {
    pub dir: usize,
    pub node: NodeId,
    pub depth: usize,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub(super) enum AppMode {
    Normal,
    Filtering,
}
