pub(super) const ROOT_LONG_ABOUT: &str = "\
Verify an installation against the published checksums of its release

Coreward compares every file of an installation with the manifest of known-good
checksums published for its release. Files are reported as added, removed or
modified, and flagged files can be restored, deleted or marked as fixed.

CORE CONCEPTS:

  Scanned roots:
    The files directly in the installation root plus the two core directories
    (wp-admin and wp-includes by default), recursively. Customization areas such
    as themes and plugins are never checked.

  Manifest:
    The mapping of relative path to checksum for one release, read from
    <manifest-dir>/<release>/checksums-<locale>.json or checksums.json. Original
    file contents for restore and diff live under <manifest-dir>/<release>/files/.

  Suppressions:
    Paths an operator marked as fixed. They are still checked but hidden from
    reports. Common server files are suppressed once on the first scan.

TYPICAL WORKFLOW:

  1. Check the installation:
     $ coreward -C /var/www/site status

  2. Inspect a modified core file:
     $ coreward diff wp-includes/load.php

  3. Remediate:
     $ coreward apply --action restore --confirm modified@wp-includes/load.php
     $ coreward apply --action delete --confirm added@wp-admin/shell.php
     $ coreward apply --action fixed --confirm added@robots-custom.php

  4. Schedule unattended scans:
     $ coreward -C /var/www/site --audit-log /var/log/coreward.jsonl scan

CONFIGURATION:

  Settings are read from coreward.toml in the installation root, or the file
  given with --config. Command line flags take precedence. The release and
  locale are detected from <core dir>/version.php when not configured.

EXIT STATUS:

  0    No actionable discrepancies, or a batch was processed
  1    Discrepancies found
  255  Any error, including an unavailable manifest

For detailed help on any command, use:
  coreward <command> --help
";

pub(super) const STATUS_LONG_ABOUT: &str = "\
Show files that differ from the release

Each line starts with a status code:

  A   Added: present locally but not part of the release
  R   Removed: part of the release but missing locally
  M   Modified: content differs from the release
  .   Stable: content matches (only with --all)

Size and modification time follow when known. '(no permission)' marks files the
current user could not remediate. Suppressed files are hidden unless
--show-suppressed is given.

A release without a manifest is an error, never a clean result.
";

pub(super) const SCAN_LONG_ABOUT: &str = "\
Unattended scan reporting discrepancies to the audit log

Runs the same reconciliation as 'status' without printing files. When actionable
discrepancies exist, one warning event with the counts is sent to the audit
log, which is the hand-off point for notifications. Meant for cron:

  */30 * * * * coreward -C /var/www/site --audit-log /var/log/coreward.jsonl scan
";

pub(super) const APPLY_LONG_ABOUT: &str = "\
Restore, delete or mark as fixed a batch of flagged files

Entries use the form CLASSIFICATION@PATH as printed by status, for example
modified@wp-includes/load.php. Only the first '@' separates the two parts.

ACTIONS:

  restore   Write the released content to the path, creating parent directories
  delete    Remove the file
  fixed     Suppress the path so it is no longer reported

The batch is rejected without changes when --confirm is missing, the action is
unknown or no entry is given. Malformed entries are skipped. Every batch logs
one audit event with the affected paths and a summary of processed entries.
";
