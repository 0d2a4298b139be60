//! Mapping between [`RepositoryRecord`] fields and a [`ConfigStore`].

use crate::config::Settings;
use crate::record::{AccessRestriction, AuthorizationControl, MergeType, RepositoryRecord};
use crate::storage::ConfigStore;
use chrono::{DateTime, Utc};

pub(crate) const DESCRIPTION: &str = "description";
pub(crate) const ORIGIN_REPOSITORY: &str = "origin_repository";
const OWNERS: &str = "owners";
const ACCEPT_NEW_PATCHSETS: &str = "accept_new_patchsets";
const ACCEPT_NEW_TICKETS: &str = "accept_new_tickets";
const REQUIRE_APPROVAL: &str = "require_approval";
const MERGE_TO: &str = "merge_to";
const MERGE_TYPE: &str = "merge_type";
const USE_INCREMENTAL_PUSH_TAGS: &str = "use_incremental_push_tags";
const INCREMENTAL_PUSH_TAG_PREFIX: &str = "incremental_push_tag_prefix";
const ALLOW_FORKS: &str = "allow_forks";
const ACCESS_RESTRICTION: &str = "access_restriction";
const AUTHORIZATION_CONTROL: &str = "authorization_control";
const VERIFY_COMMITTER: &str = "verify_committer";
const SHOW_REMOTE_BRANCHES: &str = "show_remote_branches";
const IS_FROZEN: &str = "is_frozen";
const SKIP_SIZE_CALCULATION: &str = "skip_size_calculation";
const SKIP_SUMMARY_METRICS: &str = "skip_summary_metrics";
const GC_THRESHOLD: &str = "gc_threshold";
const GC_PERIOD: &str = "gc_period";
pub(crate) const LAST_GC: &str = "last_gc";
const MAX_ACTIVITY_COMMITS: &str = "max_activity_commits";
const PRE_RECEIVE_SCRIPTS: &str = "pre_receive_scripts";
const POST_RECEIVE_SCRIPTS: &str = "post_receive_scripts";
const MAILING_LISTS: &str = "mailing_lists";
const INDEXED_BRANCHES: &str = "indexed_branches";
const METRIC_AUTHOR_EXCLUSIONS: &str = "metric_author_exclusions";

/// Name of the remote whose URL is the record's `origin`.
pub(crate) const ORIGIN_REMOTE: &str = "origin";

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Fills the durable fields of `record` from `config`, applying the server
/// defaults for anything unset.
pub(crate) fn read_record(record: &mut RepositoryRecord, config: &dyn ConfigStore, settings: &Settings) {
    let catalog = &settings.catalog;
    let origin = config.remotes().into_iter().find(|r| r.name == ORIGIN_REMOTE);
    let has_origin = origin.is_some();
    if let Some(remote) = origin {
        record.origin = Some(remote.url.replace('\\', "/"));
        record.is_mirror = remote.mirror;
    }

    record.description = config.get_string_or(DESCRIPTION, "");
    record.origin_repository = non_empty(config.get_string(ORIGIN_REPOSITORY));
    record.owners.clear();
    let owners = config.get_string_list(OWNERS);
    record.add_owners(owners.iter().map(String::as_str));
    record.accept_new_patchsets = config.get_bool(ACCEPT_NEW_PATCHSETS, true);
    record.accept_new_tickets = config.get_bool(ACCEPT_NEW_TICKETS, true);
    record.require_approval = config.get_bool(REQUIRE_APPROVAL, settings.tickets.require_approval);
    record.merge_to = non_empty(config.get_string(MERGE_TO));
    record.merge_type = config
        .get_string(MERGE_TYPE)
        .map(|name| MergeType::from_name(&name, settings.tickets.merge_type))
        .unwrap_or(settings.tickets.merge_type);
    record.use_incremental_push_tags = config.get_bool(USE_INCREMENTAL_PUSH_TAGS, false);
    record.incremental_push_tag_prefix = non_empty(config.get_string(INCREMENTAL_PUSH_TAG_PREFIX));
    record.allow_forks = config.get_bool(ALLOW_FORKS, true);

    let default_restriction =
        AccessRestriction::from_name(&catalog.default_access_restriction, AccessRestriction::Push);
    record.access_restriction = config
        .get_string(ACCESS_RESTRICTION)
        .map(|name| AccessRestriction::from_name(&name, default_restriction))
        .unwrap_or(default_restriction);
    let default_control = AuthorizationControl::from_name(
        &catalog.default_authorization_control,
        AuthorizationControl::Named,
    );
    record.authorization_control = config
        .get_string(AUTHORIZATION_CONTROL)
        .map(|name| AuthorizationControl::from_name(&name, default_control))
        .unwrap_or(default_control);

    record.verify_committer = config.get_bool(VERIFY_COMMITTER, false);
    record.show_remote_branches = config.get_bool(SHOW_REMOTE_BRANCHES, has_origin);
    record.is_frozen = config.get_bool(IS_FROZEN, false);
    record.skip_size_calculation = config.get_bool(SKIP_SIZE_CALCULATION, false);
    record.skip_summary_metrics = config.get_bool(SKIP_SUMMARY_METRICS, false);
    record.gc_threshold = config.get_string_or(GC_THRESHOLD, &settings.gc.default_threshold);
    record.gc_period = config.get_int(GC_PERIOD, settings.gc.default_period_days);
    record.last_gc = config
        .get_string(LAST_GC)
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    record.max_activity_commits =
        config.get_int(MAX_ACTIVITY_COMMITS, catalog.max_activity_commits as i64) as i32;

    record.pre_receive_scripts = config.get_string_list(PRE_RECEIVE_SCRIPTS);
    record.post_receive_scripts = config.get_string_list(POST_RECEIVE_SCRIPTS);
    record.mailing_lists = config.get_string_list(MAILING_LISTS);
    record.indexed_branches = config.get_string_list(INDEXED_BRANCHES);
    record.metric_author_exclusions = config.get_string_list(METRIC_AUTHOR_EXCLUSIONS);
    record.custom_fields = config.custom_fields();
}

/// Writes every durable field of `record` into `config` without saving.
///
/// Fields equal to the server default are unset so later default changes
/// apply to them.
pub(crate) fn write_record(record: &RepositoryRecord, config: &mut dyn ConfigStore, settings: &Settings) {
    config.set_or_unset(DESCRIPTION, Some(record.description.as_str()));
    config.set_or_unset(ORIGIN_REPOSITORY, record.origin_repository.as_deref());
    config.set_string_list(OWNERS, &record.owners);
    config.set_bool(ACCEPT_NEW_PATCHSETS, record.accept_new_patchsets);
    config.set_bool(ACCEPT_NEW_TICKETS, record.accept_new_tickets);

    if record.require_approval == settings.tickets.require_approval {
        config.unset(REQUIRE_APPROVAL);
    } else {
        config.set_bool(REQUIRE_APPROVAL, record.require_approval);
    }
    config.set_or_unset(MERGE_TO, record.merge_to.as_deref());
    if record.merge_type == settings.tickets.merge_type {
        config.unset(MERGE_TYPE);
    } else {
        config.set_string(MERGE_TYPE, record.merge_type.name());
    }
    config.set_bool(USE_INCREMENTAL_PUSH_TAGS, record.use_incremental_push_tags);
    match record.incremental_push_tag_prefix.as_deref() {
        Some(prefix) if !prefix.is_empty() && prefix != settings.tickets.incremental_push_tag_prefix => {
            config.set_string(INCREMENTAL_PUSH_TAG_PREFIX, prefix)
        }
        _ => config.unset(INCREMENTAL_PUSH_TAG_PREFIX),
    }
    config.set_bool(ALLOW_FORKS, record.allow_forks);
    config.set_string(ACCESS_RESTRICTION, record.access_restriction.name());
    config.set_string(AUTHORIZATION_CONTROL, record.authorization_control.name());
    config.set_bool(VERIFY_COMMITTER, record.verify_committer);
    config.set_bool(SHOW_REMOTE_BRANCHES, record.show_remote_branches);
    config.set_bool(IS_FROZEN, record.is_frozen);
    config.set_bool(SKIP_SIZE_CALCULATION, record.skip_size_calculation);
    config.set_bool(SKIP_SUMMARY_METRICS, record.skip_summary_metrics);
    config.set_string(GC_THRESHOLD, &record.gc_threshold);
    if record.gc_period == settings.gc.default_period_days {
        config.unset(GC_PERIOD);
    } else {
        config.set_int(GC_PERIOD, record.gc_period);
    }
    if record.last_gc > DateTime::<Utc>::UNIX_EPOCH {
        config.set_string(LAST_GC, &record.last_gc.to_rfc3339());
    }
    if record.max_activity_commits == settings.catalog.max_activity_commits {
        config.unset(MAX_ACTIVITY_COMMITS);
    } else {
        config.set_int(MAX_ACTIVITY_COMMITS, record.max_activity_commits as i64);
    }

    config.set_string_list(PRE_RECEIVE_SCRIPTS, &record.pre_receive_scripts);
    config.set_string_list(POST_RECEIVE_SCRIPTS, &record.post_receive_scripts);
    config.set_string_list(MAILING_LISTS, &record.mailing_lists);
    config.set_string_list(INDEXED_BRANCHES, &record.indexed_branches);
    config.set_string_list(METRIC_AUTHOR_EXCLUSIONS, &record.metric_author_exclusions);
    config.set_custom_fields(&record.custom_fields);
}
