//! In-page instrumentation bundles (component C).
//!
//! These five scripts are treated as opaque data: the binding name `sendLink` and
//! the `data-dom-events` attribute name are observed by the host and must not change.

/// Forces the page to look like a non-automated browser. Injected on every new document.
pub const ANTI_DETECTION_JS: &str = r#"(function(w, n, wn) {
    Object.defineProperty(n, 'webdriver', { get: () => false });
    Object.defineProperty(n, 'plugins', { get: () => [1, 2, 3, 4, 5] });
    Object.defineProperty(n, 'languages', { get: () => ['en-US', 'en'] });
    w.chrome = w.chrome || { runtime: {} };
    const originalQuery = wn.permissions.query;
    wn.permissions.query = (parameters) => (
        parameters.name === 'notifications'
            ? Promise.resolve({ state: Notification.permission })
            : originalQuery(parameters)
    );
})(window, navigator, window.navigator);"#;

/// Hooks `window.open`/`close`, neutralizes form reset, records DOM0/DOM2 event
/// registrations into `data-dom-events`, and installs the task queue + stability
/// tracker the host polls from `LoadEventFired` onward. Injected on every new document.
pub const INIT_HOOK_JS: &str = r#"(function () {
    window.__flamingoStability = {
        lastMutationTime: Date.now(),
        lastTaskTime: Date.now(),
        pendingTasks: 0,
        isStable: function (quietPeriod) {
            const now = Date.now();
            return this.pendingTasks === 0
                && (now - this.lastMutationTime) > quietPeriod
                && (now - this.lastTaskTime) > quietPeriod;
        }
    };

    window.__flamingoQueue = Promise.resolve();
    window.__flamingoEnqueue = function (fn) {
        window.__flamingoStability.pendingTasks++;
        window.__flamingoStability.lastTaskTime = Date.now();
        window.__flamingoQueue = window.__flamingoQueue.then(function () {
            try { fn(); } catch (e) {}
        }).finally(function () {
            window.__flamingoStability.pendingTasks--;
            window.__flamingoStability.lastTaskTime = Date.now();
        });
    };

    window.open = function (url) {
        window.sendLink(JSON.stringify({ url: new URL(url, document.baseURI).href, source: 'open' }));
        return null;
    };
    Object.defineProperty(window, 'open', { writable: false, configurable: false });

    window.close = function () {};
    Object.defineProperty(window, 'close', { writable: false, configurable: false });

    HTMLFormElement.prototype.reset = function () {};
    Object.defineProperty(HTMLFormElement.prototype, 'reset', { writable: false, configurable: false });

    var DOM_EVENT_FLAG = 'data-dom-events';

    function recordDomEvent(el, eventName) {
        if (!el.hasAttribute(DOM_EVENT_FLAG)) {
            el.setAttribute(DOM_EVENT_FLAG, eventName);
        } else {
            el.setAttribute(DOM_EVENT_FLAG, el.getAttribute(DOM_EVENT_FLAG) + ',' + eventName);
        }
    }

    var DOM_EVENTS = ['abort', 'afterprint', 'animationend', 'animationiteration', 'animationstart',
        'beforeprint', 'beforeunload', 'blur', 'canplay', 'canplaythrough', 'change', 'click',
        'contextmenu', 'copy', 'cut', 'dblclick', 'drag', 'dragend', 'dragenter', 'dragleave',
        'dragover', 'dragstart', 'drop', 'durationchange', 'ended', 'error', 'focus', 'focusin',
        'focusout', 'fullscreenchange', 'fullscreenerror', 'hashchange', 'input', 'invalid',
        'keydown', 'keypress', 'keyup', 'load', 'loadeddata', 'loadedmetadata', 'loadstart',
        'message', 'mousedown', 'mouseenter', 'mouseleave', 'mousemove', 'mouseout', 'mouseover',
        'mouseup', 'mousewheel', 'offline', 'online', 'open', 'pagehide', 'pageshow', 'paste',
        'pause', 'play', 'playing', 'popstate', 'progress', 'ratechange', 'reset', 'resize',
        'scroll', 'search', 'seeked', 'seeking', 'select', 'show', 'stalled', 'storage', 'submit',
        'suspend', 'timeupdate', 'toggle', 'touchcancel', 'touchend', 'touchmove', 'touchstart',
        'transitionend', 'unload', 'volumechange', 'waiting', 'wheel'];

    DOM_EVENTS.forEach(function (eventName) {
        Object.defineProperty(HTMLElement.prototype, 'on' + eventName, {
            configurable: false,
            set: function (handler) {
                recordDomEvent(this, eventName);
                window['on' + eventName] = handler;
            }
        });
    });

    var originalAddEventListener = Element.prototype.addEventListener;
    Element.prototype.addEventListener = function (type) {
        recordDomEvent(this, type);
        return originalAddEventListener.apply(this, arguments);
    };
})();"#;

/// Observes DOM mutations for new/changed link-bearing attributes and reports them
/// through `sendLink`. Injected after every `LoadEventFired`, before the collector.
pub const MUTATION_OBSERVER_JS: &str = r#"(function () {
    var LINK_ATTRS = ['href', 'src', 'data-href', 'data-url', 'data-link'];
    var LINK_SELECTOR = LINK_ATTRS.map(function (attr) { return '[' + attr + ']'; }).join(',');

    function report(rawValue) {
        if (!rawValue) { return; }
        if (rawValue.toLowerCase().startsWith('javascript:')) {
            window.__flamingoEnqueue(function () {
                try { eval(rawValue.substring(11)); } catch (e) {}
            });
            return;
        }
        window.__flamingoEnqueue(function () {
            window.sendLink(JSON.stringify({ url: new URL(rawValue, document.baseURI).href, source: 'DOM' }));
        });
    }

    function reportElement(el) {
        LINK_ATTRS.forEach(function (attr) {
            report(el.getAttribute(attr));
        });
    }

    var observer = new MutationObserver(function (mutations) {
        window.__flamingoStability.lastMutationTime = Date.now();
        mutations.forEach(function (mutation) {
            if (mutation.type === 'childList') {
                for (var i = 0; i < mutation.addedNodes.length; i++) {
                    var node = mutation.addedNodes[i];
                    if (node.nodeType === Node.ELEMENT_NODE) {
                        reportElement(node);
                        if (typeof node.querySelectorAll === 'function') {
                            node.querySelectorAll(LINK_SELECTOR).forEach(reportElement);
                        }
                    }
                }
            } else if (mutation.type === 'attributes') {
                var target = mutation.target;
                if (target.nodeType === Node.ELEMENT_NODE) {
                    report(target.getAttribute(mutation.attributeName));
                }
            }
        });
    });

    observer.observe(document.documentElement, {
        subtree: true,
        childList: true,
        attributes: true,
        attributeFilter: LINK_ATTRS
    });
})();"#;

/// Collects comment-embedded URLs, link attributes, and recorded DOM0/DOM2 events,
/// then dispatches every collected event through the task queue. Injected after
/// [`MUTATION_OBSERVER_JS`].
pub const COLLECT_AND_TRIGGER_JS: &str = r#"(function () {
    var urlRe = /https?:\/\/(?:www\.)?[-a-zA-Z0-9@:%._\+~#=]{1,256}\.[a-zA-Z0-9()]{1,6}\b(?:[-a-zA-Z0-9()@:%_\+.~#?&\/=]*)/g;
    var linkAttrs = ['src', 'href', 'data-href', 'data-url', 'data-link'];
    var domEventFlag = 'data-dom-events';

    var walker = document.createTreeWalker(
        document.documentElement,
        NodeFilter.SHOW_ELEMENT | NodeFilter.SHOW_COMMENT,
        { acceptNode: function (node) { return NodeFilter.FILTER_ACCEPT; } }
    );

    var dispatches = [];
    var node = walker.currentNode;
    while (node) {
        if (node.nodeType === Node.COMMENT_NODE) {
            var match;
            while ((match = urlRe.exec(node.nodeValue))) {
                (function (url) {
                    window.__flamingoEnqueue(function () {
                        window.sendLink(JSON.stringify({ url: new URL(url, document.baseURI).href, source: 'comment' }));
                    });
                })(match[0]);
            }
        } else {
            for (var i = 0; i < node.attributes.length; i++) {
                var attr = node.attributes[i];
                if (linkAttrs.indexOf(attr.nodeName) !== -1 && attr.nodeValue) {
                    if (attr.nodeValue.toLowerCase().startsWith('javascript:')) {
                        (function (payload) {
                            window.__flamingoEnqueue(function () {
                                try { eval(payload.substring(11)); } catch (e) {}
                            });
                        })(attr.nodeValue);
                    } else {
                        (function (href) {
                            window.__flamingoEnqueue(function () {
                                window.sendLink(JSON.stringify({ url: new URL(href, document.baseURI).href, source: 'href' }));
                            });
                        })(attr.nodeValue);
                    }
                } else if (attr.nodeName.indexOf('on') === 0 && attr.nodeName.length > 2) {
                    dispatches.push({ name: attr.nodeName.substring(2), el: node });
                } else if (attr.nodeName === domEventFlag) {
                    attr.nodeValue.split(',').forEach(function (name) {
                        dispatches.push({ name: name, el: node });
                    });
                }
            }
        }
        node = walker.nextNode();
    }

    dispatches.forEach(function (item) {
        window.__flamingoEnqueue(function () {
            try {
                item.el.dispatchEvent(new Event(item.name, { bubbles: true }));
            } catch (e) {}
        });
    });
})();"#;

/// Fills every form on the page with heuristically-chosen values and submits it.
/// Injected last, after the mutation observer and collector are installed.
pub const FILL_AND_SUBMIT_FORMS_JS: &str = r#"(function () {
    var iframe = document.createElement('iframe');
    iframe.style.display = 'none';
    iframe.name = 'flamingo_submit_sink';
    document.body.appendChild(iframe);

    function random(characters, length) {
        var result = '';
        for (var i = 0; i < length; i++) {
            result += characters.charAt(Math.floor(Math.random() * characters.length));
        }
        return result;
    }

    function pick(arr) {
        return arr[Math.floor(Math.random() * arr.length)];
    }

    var corpus = {
        digit: '123456789',
        letter: 'abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ',
        symbol: '~!@#$%^&*()',
        year: ['1990', '1991', '1992', '1993', '1994', '1995'],
        month: ['01', '02', '03', '04', '05', '06', '07', '08', '09', '10', '11', '12'],
        day: ['01', '07', '10', '23'],
        firstname: ['alex', 'jamie', 'sam', 'morgan', 'taylor'],
        lastname: ['smith', 'lee', 'patel'],
        address: ['123 Main St', '456 Oak Ave', '789 Pine Rd'],
        domain: ['.example', '.test', '.invalid']
    };

    var forms = [];
    for (var f = 0; f < document.forms.length; f++) {
        var form = document.forms[f];
        form.setAttribute('target', iframe.name);
        forms.push(form);

        for (var j = 0; j < form.length; j++) {
            var el = form[j];
            if (el.nodeName === 'INPUT') {
                if (el.type === 'text') {
                    if (/((number)|(phone))|(^tel)/i.test(el.name)) {
                        el.value = '555' + random(corpus.digit, 7);
                    } else if (/mail|email/i.test(el.name)) {
                        el.value = pick(corpus.firstname) + '.' + pick(corpus.lastname) + '@' + random(corpus.digit, 5) + pick(corpus.domain);
                    } else if (/url|website|blog|homepage/i.test(el.name)) {
                        el.value = 'https://www.' + random(corpus.digit, 5) + pick(corpus.domain);
                    } else if (/(date)|(^birth)/i.test(el.name)) {
                        el.value = pick(corpus.year) + pick(corpus.month) + pick(corpus.day);
                    } else if (/^addr/i.test(el.name)) {
                        el.value = pick(corpus.address);
                    } else {
                        el.value = 'flamingo';
                    }
                } else if (el.type === 'password') {
                    el.value = random(corpus.letter, 4) + random(corpus.symbol, 2) + random(corpus.digit, 4);
                } else if (el.type === 'radio' || el.type === 'checkbox') {
                    el.checked = true;
                } else if (['month', 'week', 'date', 'datetime-local', 'time'].indexOf(el.type) !== -1) {
                    var year = pick(corpus.year), month = pick(corpus.month), day = pick(corpus.day);
                    if (el.type === 'month') { el.value = year + '-' + month; }
                    else if (el.type === 'week') { el.value = year + '-W10'; }
                    else if (el.type === 'date') { el.value = year + '-' + month + '-' + day; }
                    else if (el.type === 'datetime-local') { el.value = year + '-' + month + '-' + day + 'T10:00'; }
                    else { el.value = '10:00'; }
                } else if (el.type === 'email') {
                    el.value = pick(corpus.firstname) + '.' + pick(corpus.lastname) + '@' + random(corpus.digit, 5) + pick(corpus.domain);
                } else if (el.type === 'number' || el.type === 'range') {
                    if (el.hasAttribute('min') && el.hasAttribute('max')) {
                        el.value = Math.floor(Math.random() * (el.max - el.min + 1) + Number(el.min));
                    } else if (el.hasAttribute('min')) {
                        el.value = Number(el.min) + 1;
                    } else if (el.hasAttribute('max')) {
                        el.value = Number(el.max) - 1;
                    } else {
                        el.value = random(corpus.digit, 1);
                    }
                } else if (el.type === 'search') {
                    el.value = 'flamingo';
                } else if (el.type === 'url') {
                    el.value = 'https://www.' + random(corpus.digit, 5) + pick(corpus.domain);
                }
            } else if (el.nodeName === 'TEXTAREA') {
                el.value = 'tested by flamingo';
            }
        }
    }

    forms.forEach(function (form) {
        try {
            form.submit();
        } catch (e) {
            var submitEl = form.querySelector('input[type=submit], input[type=button], button');
            if (submitEl) {
                try { submitEl.click(); } catch (e2) {}
            }
        }
    });
})();"#;
