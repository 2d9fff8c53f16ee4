use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;

use crate::models::Role;

/// Where unauthenticated navigations are sent.
pub const LOGIN_PATH: &str = "/login";

/// DashboardView
///
/// The page component the SPA renders for a dashboard route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum DashboardView {
    StudentDashboard,
    MentorDashboard,
    EmployerDashboard,
    PlacementCellDashboard,
    AdminDashboard,
}

impl DashboardView {
    pub fn title(self) -> &'static str {
        match self {
            DashboardView::StudentDashboard => "Student Dashboard",
            DashboardView::MentorDashboard => "Mentor Dashboard",
            DashboardView::EmployerDashboard => "Employer Dashboard",
            DashboardView::PlacementCellDashboard => "Placement Cell Dashboard",
            DashboardView::AdminDashboard => "Admin Dashboard",
        }
    }
}

/// ProtectedRoute
///
/// One entry of the route table: a path, the roles allowed to open it, and its view.
/// An empty `roles` slice means any signed-in user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtectedRoute {
    pub path: &'static str,
    pub roles: &'static [Role],
    pub view: DashboardView,
}

impl ProtectedRoute {
    pub fn allows(&self, role: Role) -> bool {
        self.roles.is_empty() || self.roles.contains(&role)
    }
}

impl Role {
    /// Landing route of the role's own dashboard.
    pub fn dashboard_route(self) -> &'static str {
        self.home().path
    }

    pub fn dashboard_view(self) -> DashboardView {
        self.home().view
    }

    fn home(self) -> &'static ProtectedRoute {
        match self {
            Role::Student => &PROTECTED_ROUTES[0],
            Role::Mentor => &PROTECTED_ROUTES[1],
            Role::Employer => &PROTECTED_ROUTES[2],
            Role::Placement => &PROTECTED_ROUTES[3],
            Role::Admin => &PROTECTED_ROUTES[4],
        }
    }
}

/// Every guarded route of the portal.
pub static PROTECTED_ROUTES: [ProtectedRoute; 5] = [
    ProtectedRoute {
        path: "/dashboard/student",
        roles: &[Role::Student],
        view: DashboardView::StudentDashboard,
    },
    ProtectedRoute {
        path: "/dashboard/mentor",
        roles: &[Role::Mentor],
        view: DashboardView::MentorDashboard,
    },
    ProtectedRoute {
        path: "/dashboard/employer",
        roles: &[Role::Employer],
        view: DashboardView::EmployerDashboard,
    },
    ProtectedRoute {
        path: "/dashboard/placement",
        roles: &[Role::Placement],
        view: DashboardView::PlacementCellDashboard,
    },
    ProtectedRoute {
        path: "/dashboard/admin",
        roles: &[Role::Admin],
        view: DashboardView::AdminDashboard,
    },
];

pub fn find_route(path: &str) -> Option<&'static ProtectedRoute> {
    let path = match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    };
    PROTECTED_ROUTES.iter().find(|route| route.path == path)
}

/// Routes a signed-in user with `role` may open, for building navigation.
pub fn routes_for(role: Role) -> impl Iterator<Item = &'static ProtectedRoute> {
    PROTECTED_ROUTES.iter().filter(move |route| route.allows(role))
}
