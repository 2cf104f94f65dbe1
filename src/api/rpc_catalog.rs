//! RPC method catalog (`spec.md` §1 Non-goals: "the gRPC wire layer beyond
//! its method catalog" is explicitly out of scope for this core — the
//! binary transport, proto compilation, and streaming semantics are an
//! external collaborator's job). This module documents the method names and
//! request/response shapes a gRPC (or any other RPC) transport would need
//! to expose over the same [`crate::pipeline::Pipeline`] calls the REST
//! handlers in [`super::handlers`] already use, so both surfaces stay in
//! lockstep without duplicating validation or authorization logic.

/// One entry per RPC method: its name, the `Pipeline` method it forwards
/// to, and a short description of its request shape. Kept as plain data
/// (not proto definitions — no `.proto` compiler is part of this crate's
/// dependency stack) so a future transport crate can generate its service
/// definition from this catalog instead of hand-copying it.
#[derive(Debug, Clone, Copy)]
pub struct RpcMethod {
    pub name: &'static str,
    pub pipeline_method: &'static str,
    pub description: &'static str,
}

pub const METHODS: &[RpcMethod] = &[
    RpcMethod { name: "CreateTenant", pipeline_method: "create_tenant", description: "Create a tenant (super_admin only)." },
    RpcMethod { name: "CreateOrganization", pipeline_method: "create_organization", description: "Create an organization node under an optional parent." },
    RpcMethod { name: "ReparentOrganization", pipeline_method: "reparent_organization", description: "Move an organization to a new parent, revision-gated." },
    RpcMethod { name: "DeleteOrganization", pipeline_method: "delete_organization", description: "Delete an organization, optionally cascading to descendants." },
    RpcMethod { name: "GetOrganization", pipeline_method: "get_organization", description: "Fetch one organization by id." },
    RpcMethod { name: "ListOrganizations", pipeline_method: "list_organizations", description: "Paginated, authorization-filtered organization listing." },
    RpcMethod { name: "CreateEntity", pipeline_method: "create_entity", description: "Create an entity within an organization." },
    RpcMethod { name: "UpdateEntity", pipeline_method: "update_entity", description: "Revision-gated partial update of an entity." },
    RpcMethod { name: "DeleteEntity", pipeline_method: "delete_entity", description: "Delete an entity, optionally cascading its dependencies." },
    RpcMethod { name: "GetEntity", pipeline_method: "get_entity", description: "Fetch one entity by id." },
    RpcMethod { name: "ListEntities", pipeline_method: "list_entities", description: "Paginated, authorization-filtered entity listing." },
    RpcMethod { name: "CreateDependency", pipeline_method: "create_dependency", description: "Create a dependency edge; rejected if it would close a hard-subgraph cycle." },
    RpcMethod { name: "DeleteDependency", pipeline_method: "delete_dependency", description: "Delete a dependency edge." },
    RpcMethod { name: "GetDependency", pipeline_method: "get_dependency", description: "Fetch one dependency by id." },
    RpcMethod { name: "ListDependencies", pipeline_method: "list_dependencies", description: "Paginated dependency listing, optionally filtered to one entity's edges." },
    RpcMethod { name: "CreateIdentity", pipeline_method: "create_identity", description: "Provision an identity within a tenant." },
    RpcMethod { name: "GrantResourceRole", pipeline_method: "grant_resource_role", description: "Grant a scoped role to an identity." },
    RpcMethod { name: "CreateIssue", pipeline_method: "create_issue", description: "File an issue against a tenant or organization." },
    RpcMethod { name: "UpdateIssue", pipeline_method: "update_issue", description: "Revision-gated partial update of an issue." },
    RpcMethod { name: "DeleteIssue", pipeline_method: "delete_issue", description: "Delete an issue." },
    RpcMethod { name: "ListIssues", pipeline_method: "list_issues", description: "Paginated issue listing, priority-ordered." },
    RpcMethod { name: "CreateLabel", pipeline_method: "create_label", description: "Create a label within a tenant." },
    RpcMethod { name: "ListLabels", pipeline_method: "list_labels", description: "Paginated label listing." },
    RpcMethod { name: "AttachLabel", pipeline_method: "attach_label", description: "Attach a label to an issue (idempotent)." },
    RpcMethod { name: "CreateIssueComment", pipeline_method: "add_issue_comment", description: "Append a comment to an issue." },
    RpcMethod { name: "ListIssueComments", pipeline_method: "list_issue_comments", description: "Chronological comment thread for an issue." },
    RpcMethod { name: "CreateMilestone", pipeline_method: "create_milestone", description: "Create a milestone within an organization." },
    RpcMethod { name: "UpdateMilestone", pipeline_method: "update_milestone", description: "Revision-gated partial update of a milestone." },
    RpcMethod { name: "DeleteMilestone", pipeline_method: "delete_milestone", description: "Delete a milestone." },
    RpcMethod { name: "ListMilestones", pipeline_method: "list_milestones", description: "Paginated milestone listing." },
    RpcMethod { name: "CreateProject", pipeline_method: "create_project", description: "Create a project within an organization." },
    RpcMethod { name: "UpdateProject", pipeline_method: "update_project", description: "Revision-gated partial update of a project." },
    RpcMethod { name: "DeleteProject", pipeline_method: "delete_project", description: "Delete a project." },
    RpcMethod { name: "ListProjects", pipeline_method: "list_projects", description: "Paginated project listing." },
    RpcMethod { name: "CreateOnCallRotation", pipeline_method: "create_oncall_rotation", description: "Define a rotation's shifts for a scope." },
    RpcMethod { name: "CurrentOnCall", pipeline_method: "current_on_call", description: "Resolve who is on call for a scope at an instant." },
    RpcMethod { name: "OnCallTimeline", pipeline_method: "who_is_on_call_between", description: "Partition a time range into on-call segments." },
    RpcMethod { name: "CreateGroup", pipeline_method: "create_group", description: "Create an approval-gated group." },
    RpcMethod { name: "SubmitAccessRequest", pipeline_method: "submit_access_request", description: "Request membership in a group." },
    RpcMethod { name: "DecideAccessRequest", pipeline_method: "decide_access_request", description: "Approve or deny a pending access request." },
    RpcMethod { name: "LookupVillageId", pipeline_method: "lookup_village_id", description: "Resolve a Village-ID to its kind, internal id, and canonical path." },
    RpcMethod { name: "GraphImpact", pipeline_method: "graph_impact", description: "Bounded-depth upstream/downstream impact traversal from an entity." },
    RpcMethod { name: "GraphPath", pipeline_method: "graph_path", description: "Shortest path between two entities, optionally filtered by edge type." },
    RpcMethod { name: "GraphAnalyze", pipeline_method: "graph_analyze", description: "Density, acyclicity, and critical-node ranking for a tenant or organization." },
    RpcMethod { name: "NetworkTopology", pipeline_method: "network_topology", description: "Node/edge list for an organization's entity graph." },
    RpcMethod { name: "QueryAuditLog", pipeline_method: "query_audit_log", description: "Filtered audit trail read, gated to admins and resource operators." },
    RpcMethod { name: "HealthCheck", pipeline_method: "n/a", description: "Liveness probe; no Pipeline call, mirrors GET /healthz." },
];
