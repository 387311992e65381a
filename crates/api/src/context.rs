use clipforge_core::OwnerId;

/// Authenticated owner for a request.
///
/// This is immutable and must be present for all job and credit routes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct OwnerContext {
    owner: OwnerId,
}

impl OwnerContext {
    pub fn new(owner: OwnerId) -> Self {
        Self { owner }
    }

    pub fn owner(&self) -> OwnerId {
        self.owner
    }
}
