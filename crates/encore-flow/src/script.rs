//! Builders for the JavaScript evaluated in page and frame contexts.
//!
//! All DOM work inside the popup's content frame happens through evaluated
//! snippets; these builders keep the strings in one place and make the
//! escaping testable. String arguments are JSON-quoted before interpolation
//! so selectors and keywords cannot break out of their literals.

use serde_json::Value;

/// JSON-quote a string for safe embedding in a JS expression.
pub(crate) fn js_string(s: &str) -> String {
    Value::String(s.to_string()).to_string()
}

/// `true` when an element matching `selector` exists.
pub(crate) fn element_presence(selector: &str) -> String {
    format!("!!document.querySelector({})", js_string(selector))
}

/// Find the date item whose text contains `label` and click its button.
/// Returns whether a click happened.
pub(crate) fn date_click(selector: &str, label: &str) -> String {
    format!(
        "(() => {{ \
            const items = Array.from(document.querySelectorAll({sel})); \
            for (const item of items) {{ \
                if (item.textContent.includes({label})) {{ \
                    const button = item.querySelector('button'); \
                    if (button) {{ button.click(); return true; }} \
                }} \
            }} \
            return false; \
        }})()",
        sel = js_string(selector),
        label = js_string(label),
    )
}

/// Mark the first time slot active by adding the page's own marker class.
/// The page reacts to the class, not to a click.
pub(crate) fn activate_first_slot(selector: &str, active_class: &str) -> String {
    format!(
        "(() => {{ \
            const slot = document.querySelector({sel}); \
            if (!slot) return false; \
            slot.classList.add({class}); \
            return true; \
        }})()",
        sel = js_string(selector),
        class = js_string(active_class),
    )
}

/// `true` once the page's reservation bootstrap is callable.
pub(crate) fn bootstrap_ready(service_object: &str) -> String {
    format!(
        "typeof {obj} !== 'undefined' \
         && typeof {obj}.reservationModule === 'function' \
         && typeof {obj}.reservationModule().reservationInit === 'function'",
        obj = service_object,
    )
}

/// Invoke the reservation bootstrap with the configured product parameters.
pub(crate) fn bootstrap_invoke(
    service_object: &str,
    product_id: &str,
    prod_type_code: &str,
    language: &str,
) -> String {
    format!(
        "{obj}.reservationModule().reservationInit({{ \
            prodId: {pid}, prodTypeCode: {ptc}, langCd: {lang} \
        }})",
        obj = service_object,
        pid = js_string(product_id),
        ptc = js_string(prod_type_code),
        lang = js_string(language),
    )
}

/// Schedule a staggered click on every collapsed zone header and return how
/// many were scheduled.
pub(crate) fn zone_expand(header_selector: &str, expanded_class: &str, stagger_ms: u64) -> String {
    format!(
        "(() => {{ \
            const headers = Array.from(document.querySelectorAll({sel})) \
                .filter((row) => !row.classList.contains({class})); \
            headers.forEach((row, index) => {{ \
                setTimeout(() => row.click(), index * {stagger_ms}); \
            }}); \
            return headers.length; \
        }})()",
        sel = js_string(header_selector),
        class = js_string(expanded_class),
    )
}

/// Click the first zone list item whose text contains `keyword`. Returns
/// whether a match was clicked.
pub(crate) fn zone_select(list_selector: &str, keyword: &str) -> String {
    format!(
        "(() => {{ \
            const items = Array.from(document.querySelectorAll({sel})); \
            const target = items.find((item) => item.textContent.includes({kw})); \
            if (!target) return false; \
            target.click(); \
            return true; \
        }})()",
        sel = js_string(list_selector),
        kw = js_string(keyword),
    )
}

/// Number of seat shapes in the diagram.
pub(crate) fn seat_count(shape_selector: &str) -> String {
    format!("document.querySelectorAll({}).length", js_string(shape_selector))
}

/// Read the selection-state attributes of the shape at `index`, or `null`
/// when the shape no longer exists.
pub(crate) fn seat_attributes(shape_selector: &str, index: u64) -> String {
    format!(
        "(() => {{ \
            const shape = document.querySelectorAll({sel})[{index}]; \
            if (!shape) return null; \
            return {{ \
                strokeWidth: shape.getAttribute('stroke-width'), \
                fillOpacity: shape.getAttribute('fill-opacity') \
            }}; \
        }})()",
        sel = js_string(shape_selector),
    )
}

/// Dispatch a bubbling click on the shape at `index`.
pub(crate) fn seat_click(shape_selector: &str, index: u64) -> String {
    format!(
        "(() => {{ \
            const shape = document.querySelectorAll({sel})[{index}]; \
            if (!shape) return false; \
            shape.dispatchEvent(new MouseEvent('click', {{ bubbles: true, cancelable: true }})); \
            return true; \
        }})()",
        sel = js_string(shape_selector),
    )
}

/// `true` when the proceed control exists and carries its active-state class.
pub(crate) fn proceed_active(selector: &str, active_class: &str) -> String {
    format!(
        "(() => {{ \
            const control = document.querySelector({sel}); \
            return !!control && control.classList.contains({class}); \
        }})()",
        sel = js_string(selector),
        class = js_string(active_class),
    )
}

/// Click an element through its own `click()` method. Returns whether the
/// element existed.
pub(crate) fn element_click(selector: &str) -> String {
    format!(
        "(() => {{ \
            const el = document.querySelector({sel}); \
            if (!el) return false; \
            el.click(); \
            return true; \
        }})()",
        sel = js_string(selector),
    )
}

/// Dispatch a synthetic bubbling click on the payment "next" control,
/// bypassing hit-testing -- the control may be present but not yet visually
/// interactive. Returns whether the control existed.
pub(crate) fn payment_click(selector: &str) -> String {
    format!(
        "(() => {{ \
            const button = document.querySelector({sel}); \
            if (!button) return false; \
            button.dispatchEvent(new MouseEvent('click', {{ bubbles: true, cancelable: true }})); \
            return true; \
        }})()",
        sel = js_string(selector),
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
